//! Order handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::products::PageQuery;
use crate::middleware::CurrentUser;
use crate::services::order::CreateOrderInput;
use crate::services::OrderService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Transaction id Wompi appends to the redirect URL
    pub transaction_id: Option<String>,
}

fn service(state: &AppState) -> OrderService {
    OrderService::new(state.db.clone(), state.wompi.clone(), state.config.clone())
}

/// Check out the cart
pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> Result<impl IntoResponse, AppError> {
    let order = service(&state).create_order(&user, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// List own orders
pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    match service(&state).list_orders(&user, query.pagination()).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get an order
pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).get_order(&user, order_id).await {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Poll the payment status of an order
pub async fn get_order_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> impl IntoResponse {
    match service(&state)
        .poll_status(&user, order_id, query.transaction_id)
        .await
    {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// New payment link for a failed order
pub async fn regenerate_payment_link(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let order = service(&state).regenerate_payment_link(&user, order_id).await?;
    Ok(Json(order))
}

/// Cancel a pending order
pub async fn cancel_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let status = service(&state).cancel_order(&user, order_id).await?;
    Ok(Json(status))
}
