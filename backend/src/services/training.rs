//! Training sessions bought together with patterns

use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{validate_schedule, Training, TrainingStatus, UserRole};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;

/// Training service
#[derive(Clone)]
pub struct TrainingService {
    db: PgPool,
}

/// Input for scheduling or rescheduling a session
#[derive(Debug, Deserialize, Validate)]
pub struct ScheduleTrainingInput {
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    #[validate(url(message = "Meeting URL must be a valid URL"))]
    pub meeting_url: Option<String>,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct TrainingRow {
    id: Uuid,
    order_item_id: Uuid,
    product_id: Uuid,
    product_title: String,
    patronista_id: Uuid,
    patronista_name: String,
    cliente_id: Uuid,
    cliente_name: String,
    status: String,
    scheduled_at: Option<DateTime<Utc>>,
    duration_minutes: Option<i32>,
    meeting_url: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TrainingRow {
    fn into_training(self) -> AppResult<Training> {
        Ok(Training {
            id: self.id,
            order_item_id: self.order_item_id,
            product_id: self.product_id,
            product_title: self.product_title,
            patronista_id: self.patronista_id,
            patronista_name: self.patronista_name,
            cliente_id: self.cliente_id,
            cliente_name: self.cliente_name,
            status: self.status.parse()?,
            scheduled_at: self.scheduled_at,
            duration_minutes: self.duration_minutes,
            meeting_url: self.meeting_url,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const TRAINING_SELECT: &str = r#"
    SELECT t.id, t.order_item_id, t.product_id, p.title AS product_title,
           t.patronista_id, pu.full_name AS patronista_name,
           t.cliente_id, cu.full_name AS cliente_name,
           t.status, t.scheduled_at, t.duration_minutes, t.meeting_url, t.notes,
           t.created_at, t.updated_at
    FROM trainings t
    JOIN products p ON p.id = t.product_id
    JOIN users pu ON pu.id = t.patronista_id
    JOIN users cu ON cu.id = t.cliente_id
"#;

/// Participants and status of a locked training row
#[derive(Debug, sqlx::FromRow)]
struct LockedTraining {
    patronista_id: Uuid,
    cliente_id: Uuid,
    status: String,
}

impl TrainingService {
    /// Create a new TrainingService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Sessions visible to the caller: own (cliente), assigned (patronista) or all (admin)
    pub async fn list_trainings(&self, user: &AuthUser) -> AppResult<Vec<Training>> {
        let filter = match user.role {
            UserRole::Admin => "TRUE",
            UserRole::Patronista => "t.patronista_id = $1",
            UserRole::Cliente => "t.cliente_id = $1",
        };

        let rows = sqlx::query_as::<_, TrainingRow>(&format!(
            "{} WHERE ($1::uuid IS NULL OR {}) ORDER BY t.scheduled_at NULLS FIRST, t.created_at DESC",
            TRAINING_SELECT, filter
        ))
        .bind(if user.is_admin() { None } else { Some(user.user_id) })
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TrainingRow::into_training).collect()
    }

    pub async fn get_training(&self, training_id: Uuid) -> AppResult<Training> {
        sqlx::query_as::<_, TrainingRow>(&format!("{} WHERE t.id = $1", TRAINING_SELECT))
            .bind(training_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Training".to_string()))?
            .into_training()
    }

    /// Set or move the session date (assigned patronista or admin)
    pub async fn schedule(
        &self,
        user: &AuthUser,
        training_id: Uuid,
        input: ScheduleTrainingInput,
    ) -> AppResult<Training> {
        input.validate()?;
        validate_schedule(input.scheduled_at, input.duration_minutes, Utc::now()).map_err(|msg| {
            AppError::validation(
                "scheduled_at",
                msg,
                "La capacitación debe programarse en el futuro y durar entre 15 y 480 minutos",
            )
        })?;

        let mut tx = self.db.begin().await?;
        let locked = Self::lock(&mut tx, training_id).await?;
        Self::require_patronista(user, &locked)?;

        let current: TrainingStatus = locked.status.parse()?;
        current.transition(TrainingStatus::Scheduled)?;

        sqlx::query(
            r#"
            UPDATE trainings
            SET status = 'scheduled', scheduled_at = $2, duration_minutes = $3,
                meeting_url = $4, notes = COALESCE($5, notes), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(training_id)
        .bind(input.scheduled_at)
        .bind(input.duration_minutes)
        .bind(&input.meeting_url)
        .bind(&input.notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(training_id = %training_id, scheduled_at = %input.scheduled_at, "Training scheduled");
        self.get_training(training_id).await
    }

    /// Mark a scheduled session as held (assigned patronista or admin)
    pub async fn complete(&self, user: &AuthUser, training_id: Uuid) -> AppResult<Training> {
        self.set_status(user, training_id, TrainingStatus::Completed).await
    }

    /// Cancel a session; any participant or an admin may do it
    pub async fn cancel(&self, user: &AuthUser, training_id: Uuid) -> AppResult<Training> {
        self.set_status(user, training_id, TrainingStatus::Cancelled).await
    }

    async fn set_status(&self, user: &AuthUser, training_id: Uuid, next: TrainingStatus) -> AppResult<Training> {
        let mut tx = self.db.begin().await?;
        let locked = Self::lock(&mut tx, training_id).await?;

        match next {
            TrainingStatus::Cancelled => {
                if !(user.owns_or_admin(locked.patronista_id) || user.user_id == locked.cliente_id) {
                    return Err(AppError::InsufficientPermissions);
                }
            }
            _ => Self::require_patronista(user, &locked)?,
        }

        let current: TrainingStatus = locked.status.parse()?;
        current.transition(next)?;

        sqlx::query("UPDATE trainings SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(training_id)
            .bind(next.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(training_id = %training_id, status = next.as_str(), "Training status changed");
        self.get_training(training_id).await
    }

    fn require_patronista(user: &AuthUser, locked: &LockedTraining) -> AppResult<()> {
        if user.owns_or_admin(locked.patronista_id) {
            Ok(())
        } else {
            Err(AppError::InsufficientPermissions)
        }
    }

    async fn lock(conn: &mut PgConnection, training_id: Uuid) -> AppResult<LockedTraining> {
        sqlx::query_as::<_, LockedTraining>(
            "SELECT patronista_id, cliente_id, status FROM trainings WHERE id = $1 FOR UPDATE",
        )
        .bind(training_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Training".to_string()))
    }
}
