//! Personalized training sessions sold with patterns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Shortest bookable session
pub const MIN_TRAINING_MINUTES: i32 = 15;
/// Longest bookable session
pub const MAX_TRAINING_MINUTES: i32 = 480;

/// Status of a training session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrainingStatus {
    /// Paid for, waiting for the patronista to schedule it
    Requested,
    Scheduled,
    Completed,
    Cancelled,
}

impl TrainingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStatus::Requested => "requested",
            TrainingStatus::Scheduled => "scheduled",
            TrainingStatus::Completed => "completed",
            TrainingStatus::Cancelled => "cancelled",
        }
    }

    /// Rescheduling keeps the session in `Scheduled`
    pub fn can_transition_to(&self, next: TrainingStatus) -> bool {
        use TrainingStatus::*;
        matches!(
            (self, next),
            (Requested, Scheduled)
                | (Requested, Cancelled)
                | (Scheduled, Scheduled)
                | (Scheduled, Completed)
                | (Scheduled, Cancelled)
        )
    }

    pub fn transition(self, next: TrainingStatus) -> Result<TrainingStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTrainingTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl std::str::FromStr for TrainingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(TrainingStatus::Requested),
            "scheduled" => Ok(TrainingStatus::Scheduled),
            "completed" => Ok(TrainingStatus::Completed),
            "cancelled" => Ok(TrainingStatus::Cancelled),
            other => Err(DomainError::UnknownVariant {
                kind: "training status",
                value: other.to_string(),
            }),
        }
    }
}

/// A training session attached to a purchased order item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Training {
    pub id: Uuid,
    pub order_item_id: Uuid,
    pub product_id: Uuid,
    pub product_title: String,
    pub patronista_id: Uuid,
    pub patronista_name: String,
    pub cliente_id: Uuid,
    pub cliente_name: String,
    pub status: TrainingStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub meeting_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Check a proposed schedule against the booking rules
pub fn validate_schedule(
    scheduled_at: DateTime<Utc>,
    duration_minutes: i32,
    now: DateTime<Utc>,
) -> Result<(), &'static str> {
    if scheduled_at <= now {
        return Err("Training must be scheduled in the future");
    }
    if !(MIN_TRAINING_MINUTES..=MAX_TRAINING_MINUTES).contains(&duration_minutes) {
        return Err("Training duration must be between 15 and 480 minutes");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_training_lifecycle() {
        let status = TrainingStatus::Requested;
        let status = status.transition(TrainingStatus::Scheduled).unwrap();
        let status = status.transition(TrainingStatus::Scheduled).unwrap();
        let status = status.transition(TrainingStatus::Completed).unwrap();
        assert!(status.transition(TrainingStatus::Cancelled).is_err());
    }

    #[test]
    fn test_requested_cannot_complete() {
        assert!(TrainingStatus::Requested
            .transition(TrainingStatus::Completed)
            .is_err());
    }

    #[test]
    fn test_validate_schedule() {
        let now = Utc::now();
        assert!(validate_schedule(now + Duration::days(1), 60, now).is_ok());
        assert!(validate_schedule(now - Duration::hours(1), 60, now).is_err());
        assert!(validate_schedule(now + Duration::days(1), 5, now).is_err());
        assert!(validate_schedule(now + Duration::days(1), 600, now).is_err());
    }
}
