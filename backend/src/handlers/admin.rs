//! Administration handlers

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use shared::{Product, User};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::admin::{AdminOrderQuery, UpdateRoleInput, UpdateStatusInput, UserQuery};
use crate::services::{AdminService, OrderService, ProductService};
use crate::AppState;

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;
    let service = AdminService::new(state.db.clone());
    Ok(Json(service.list_users(&query).await?))
}

pub async fn update_user_role(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(input): Json<UpdateRoleInput>,
) -> Result<Json<User>, AppError> {
    user.require_admin()?;
    let service = AdminService::new(state.db.clone());
    Ok(Json(service.update_role(&user, user_id, input.role).await?))
}

pub async fn update_user_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(input): Json<UpdateStatusInput>,
) -> Result<Json<User>, AppError> {
    user.require_admin()?;
    let service = AdminService::new(state.db.clone());
    Ok(Json(service.update_status(&user, user_id, input.is_active).await?))
}

/// All orders as JSON pages, or as a CSV file with `format=csv`
pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AdminOrderQuery>,
) -> Result<Response, AppError> {
    user.require_admin()?;
    let service = AdminService::new(state.db.clone());

    if query.wants_csv() {
        let csv = service.export_orders(&query).await?;
        return Ok((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"pedidos.csv\""),
            ],
            csv,
        )
            .into_response());
    }

    let orders = OrderService::new(state.db.clone(), state.wompi.clone(), state.config.clone());
    Ok(Json(service.list_orders(&orders, &query).await?).into_response())
}

pub async fn update_product_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateStatusInput>,
) -> Result<Json<Product>, AppError> {
    user.require_admin()?;
    let service = ProductService::new(state.db.clone(), state.storage.clone());
    Ok(Json(service.set_active(product_id, input.is_active).await?))
}
