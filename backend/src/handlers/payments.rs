//! Payment handlers: Wompi events and public checkout settings

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::error::AppError;
use crate::services::payment::{PaymentConfigResponse, WebhookOutcome};
use crate::services::PaymentService;
use crate::AppState;

/// Receive a Wompi event.
///
/// Verification failures return 401. Anything that passes verification is
/// acknowledged with 200, including events for unknown orders, so Wompi stops
/// retrying.
pub async fn webhook(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, AppError> {
    let service = PaymentService::new(state.db.clone(), state.config.clone());

    let event = match service.parse_event(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected Wompi event");
            return Err(e);
        }
    };

    let outcome = service.handle_event(&event).await?;
    let label = match outcome {
        WebhookOutcome::Ignored => "ignored",
        WebhookOutcome::Duplicate => "duplicate",
        WebhookOutcome::UnknownOrder => "unknown_order",
        WebhookOutcome::Applied(_) => "processed",
    };

    Ok((StatusCode::OK, Json(serde_json::json!({ "received": true, "result": label }))))
}

/// Checkout settings for the storefront
pub async fn payment_config(State(state): State<AppState>) -> Json<PaymentConfigResponse> {
    let service = PaymentService::new(state.db.clone(), state.config.clone());
    Json(service.public_config())
}
