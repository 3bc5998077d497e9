//! Training session tests
//!
//! Scheduling rules and the requested -> scheduled -> completed lifecycle.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use shared::{
    validate_schedule, TrainingStatus, MAX_TRAINING_MINUTES, MIN_TRAINING_MINUTES,
};

fn training_status_strategy() -> impl Strategy<Value = TrainingStatus> {
    prop_oneof![
        Just(TrainingStatus::Requested),
        Just(TrainingStatus::Scheduled),
        Just(TrainingStatus::Completed),
        Just(TrainingStatus::Cancelled),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn future_sessions_within_bounds_accepted(
        minutes_ahead in 1i64..200_000,
        duration in MIN_TRAINING_MINUTES..=MAX_TRAINING_MINUTES,
    ) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let at = now + Duration::minutes(minutes_ahead);
        prop_assert!(validate_schedule(at, duration, now).is_ok());
    }

    #[test]
    fn past_sessions_rejected(minutes_ago in 0i64..200_000) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let at = now - Duration::minutes(minutes_ago);
        prop_assert!(validate_schedule(at, 60, now).is_err());
    }

    #[test]
    fn out_of_range_durations_rejected(
        duration in prop_oneof![-60i32..MIN_TRAINING_MINUTES, (MAX_TRAINING_MINUTES + 1)..2_000],
    ) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        prop_assert!(validate_schedule(now + Duration::days(2), duration, now).is_err());
    }

    /// Completed and cancelled sessions are final
    #[test]
    fn finished_sessions_are_final(next in training_status_strategy()) {
        prop_assert!(TrainingStatus::Completed.transition(next).is_err());
        prop_assert!(TrainingStatus::Cancelled.transition(next).is_err());
    }
}

#[test]
fn test_reschedule_keeps_scheduled() {
    assert_eq!(
        TrainingStatus::Scheduled.transition(TrainingStatus::Scheduled),
        Ok(TrainingStatus::Scheduled)
    );
}

#[test]
fn test_requested_session_can_be_cancelled() {
    assert_eq!(
        TrainingStatus::Requested.transition(TrainingStatus::Cancelled),
        Ok(TrainingStatus::Cancelled)
    );
    assert!(TrainingStatus::Requested
        .transition(TrainingStatus::Completed)
        .is_err());
}
