//! Authentication handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use shared::User;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::auth::{
    AuthSession, AuthTokens, ChangePasswordInput, RegisterInput, UpdateProfileInput,
};
use crate::services::AuthService;
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Register endpoint handler
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<(StatusCode, Json<AuthSession>), AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let session = auth_service.register(body).await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// Login endpoint handler
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthSession>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let session = auth_service.login(&body.email, &body.password).await?;

    Ok(Json(session))
}

/// Refresh token endpoint handler
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<AuthTokens>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.refresh_token(&body.refresh_token).await?;

    Ok(Json(tokens))
}

/// Logout endpoint handler
pub async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    auth_service.logout(&body.refresh_token).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Current user profile
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<User>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    Ok(Json(auth_service.get_user(user.user_id).await?))
}

/// Update the current user's profile
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<User>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    Ok(Json(auth_service.update_profile(user.user_id, body).await?))
}

/// Change the current user's password
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ChangePasswordInput>,
) -> Result<StatusCode, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    auth_service.change_password(user.user_id, body).await?;

    Ok(StatusCode::NO_CONTENT)
}
