//! Training session handlers

use axum::{
    extract::{Path, State},
    Json,
};
use shared::{Training, UserRole};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::training::ScheduleTrainingInput;
use crate::services::TrainingService;
use crate::AppState;

pub async fn list_trainings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Training>>, AppError> {
    let service = TrainingService::new(state.db.clone());
    Ok(Json(service.list_trainings(&user).await?))
}

pub async fn schedule_training(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(training_id): Path<Uuid>,
    Json(input): Json<ScheduleTrainingInput>,
) -> Result<Json<Training>, AppError> {
    user.require_role(&[UserRole::Patronista])?;
    let service = TrainingService::new(state.db.clone());
    Ok(Json(service.schedule(&user, training_id, input).await?))
}

pub async fn complete_training(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(training_id): Path<Uuid>,
) -> Result<Json<Training>, AppError> {
    user.require_role(&[UserRole::Patronista])?;
    let service = TrainingService::new(state.db.clone());
    Ok(Json(service.complete(&user, training_id).await?))
}

pub async fn cancel_training(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(training_id): Path<Uuid>,
) -> Result<Json<Training>, AppError> {
    let service = TrainingService::new(state.db.clone());
    Ok(Json(service.cancel(&user, training_id).await?))
}
