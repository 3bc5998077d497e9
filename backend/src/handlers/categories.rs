//! Category administration handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::Category;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::category::CategoryInput;
use crate::services::CategoryService;
use crate::AppState;

pub async fn list_categories(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Category>>, AppError> {
    user.require_admin()?;
    let service = CategoryService::new(state.db.clone());
    Ok(Json(service.list_categories().await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    user.require_admin()?;
    let service = CategoryService::new(state.db.clone());
    Ok((StatusCode::CREATED, Json(service.create_category(input).await?)))
}

pub async fn update_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(category_id): Path<Uuid>,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Category>, AppError> {
    user.require_admin()?;
    let service = CategoryService::new(state.db.clone());
    Ok(Json(service.update_category(category_id, input).await?))
}

pub async fn delete_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(category_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require_admin()?;
    let service = CategoryService::new(state.db.clone());
    service.delete_category(category_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
