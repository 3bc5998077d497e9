//! Dashboard handlers

use axum::{extract::State, Json};
use shared::UserRole;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::dashboard::{AdminDashboard, ClienteDashboard, PatronistaDashboard};
use crate::services::DashboardService;
use crate::AppState;

pub async fn patronista_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<PatronistaDashboard>, AppError> {
    user.require_role(&[UserRole::Patronista])?;
    let service = DashboardService::new(state.db.clone());
    Ok(Json(service.patronista(user.user_id).await?))
}

pub async fn cliente_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ClienteDashboard>, AppError> {
    user.require_role(&[UserRole::Cliente])?;
    let service = DashboardService::new(state.db.clone());
    Ok(Json(service.cliente(user.user_id).await?))
}

pub async fn admin_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<AdminDashboard>, AppError> {
    user.require_admin()?;
    let service = DashboardService::new(state.db.clone());
    Ok(Json(service.admin().await?))
}
