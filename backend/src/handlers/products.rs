//! Product management handlers (patronista)

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use shared::{Pagination, UserRole};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::product::{
    CreateProductInput, ProductService, UpdateProductInput, UploadedFile,
};
use crate::services::storage::MAX_FILES_PER_REQUEST;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::from_query(self.page, self.per_page)
    }
}

fn service(state: &AppState) -> ProductService {
    ProductService::new(state.db.clone(), state.storage.clone())
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::ValidationError(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// Collect every multipart field with the given name as an uploaded file
pub async fn read_uploads(
    mut multipart: Multipart,
    field_name: &str,
    max_files: usize,
) -> AppResult<Vec<UploadedFile>> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(field_name) {
            continue;
        }
        if files.len() == max_files {
            return Err(AppError::validation(
                field_name,
                &format!("At most {} files per upload", max_files),
                &format!("Máximo {} archivos por carga", max_files),
            ));
        }
        let file_name = field.file_name().unwrap_or("archivo").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        files.push(UploadedFile {
            file_name,
            content_type,
            bytes,
        });
    }

    Ok(files)
}

/// List own products (admin: all)
pub async fn list_products(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    user.require_role(&[UserRole::Patronista])?;
    let page = service(&state).list_products(&user, query.pagination()).await?;
    Ok(Json(page))
}

/// Create a product
pub async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> Result<impl IntoResponse, AppError> {
    user.require_role(&[UserRole::Patronista])?;
    let product = service(&state).create_product(&user, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Get one of the caller's products
pub async fn get_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).get_product(&user, product_id).await {
        Ok(product) => (StatusCode::OK, Json(product)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Update a product
pub async fn update_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> impl IntoResponse {
    match service(&state).update_product(&user, product_id, input).await {
        Ok(product) => (StatusCode::OK, Json(product)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Delete (or deactivate) a product
pub async fn delete_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).delete_product(&user, product_id).await {
        Ok(outcome) => {
            (StatusCode::OK, Json(serde_json::json!({ "result": outcome }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Upload pattern files (multipart field `file`, repeatable)
pub async fn upload_files(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let files = read_uploads(multipart, "file", MAX_FILES_PER_REQUEST).await?;
    let stored = service(&state).add_files(&user, product_id, files).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "files": stored }))))
}

/// Remove a pattern file
pub async fn delete_file(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((product_id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    service(&state).delete_file(&user, product_id, file_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Upload the product thumbnail (multipart field `file`)
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let image = read_uploads(multipart, "file", 1)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            AppError::validation("file", "An image is required", "Debes adjuntar una imagen")
        })?;

    let product = service(&state).set_thumbnail(&user, product_id, image).await?;
    Ok(Json(product))
}
