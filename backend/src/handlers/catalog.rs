//! Public catalog handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::catalog::CatalogQuery;
use crate::services::CatalogService;
use crate::AppState;

fn service(state: &AppState) -> CatalogService {
    CatalogService::new(state.db.clone(), state.storage.clone())
}

/// Search active products
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> impl IntoResponse {
    match service(&state).list_products(&query).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Product detail
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).get_product(product_id).await {
        Ok(product) => (StatusCode::OK, Json(product)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Product thumbnail image
pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let thumbnail = service(&state).get_thumbnail(product_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, thumbnail.content_type),
            (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
        ],
        thumbnail.bytes,
    ))
}

/// Categories with product counts
pub async fn list_categories(State(state): State<AppState>) -> impl IntoResponse {
    match service(&state).list_categories().await {
        Ok(categories) => {
            (StatusCode::OK, Json(serde_json::json!({ "categories": categories }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Public patronista profile
pub async fn get_patronista(
    State(state): State<AppState>,
    Path(patronista_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).get_patronista(patronista_id).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => e.into_response(),
    }
}
