//! Pattern download handlers

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::file::FileDownload;
use crate::services::FileService;
use crate::AppState;

fn service(state: &AppState) -> FileService {
    FileService::new(state.db.clone(), state.storage.clone(), state.config.clone())
}

/// `attachment` disposition with an ASCII fallback and the UTF-8 name
pub fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();

    let encoded: String = file_name
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect();

    format!("attachment; filename=\"{}\"; filename*=UTF-8''{}", ascii, encoded)
}

fn file_response(download: FileDownload) -> Response {
    let disposition = HeaderValue::from_str(&content_disposition(&download.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let content_type = HeaderValue::from_str(&download.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(download.size)),
        ],
        Body::from_stream(ReaderStream::new(download.file)),
    )
        .into_response()
}

/// Download a purchased (or own) pattern file
pub async fn download_file(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(file_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let download = service(&state).download(&user, file_id).await?;
    Ok(file_response(download))
}

/// Issue a signed download link
pub async fn create_download_link(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(file_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let link = service(&state).create_signed_link(&user, file_id).await?;
    Ok(Json(link))
}

/// Download through a signed link (no bearer token needed)
pub async fn download_signed(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let download = service(&state).download_signed(&token).await?;
    Ok(file_response(download))
}

/// Files of every purchased product
pub async fn purchased_files(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let files = service(&state).purchased_files(&user).await?;
    Ok(Json(serde_json::json!({ "files": files })))
}
