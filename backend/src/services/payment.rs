//! Payment confirmation: Wompi event processing and order status updates
//!
//! Both the webhook and the status polling endpoint funnel into
//! [`PaymentService::apply_transaction_status`], which locks the order row so
//! concurrent deliveries of the same outcome settle on one result.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use shared::{settle, to_amount_in_cents, OrderStatus, Settlement, StatusChange};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::external::wompi::{WompiEvent, WompiTransaction};

/// Event type carrying transaction updates
pub const TRANSACTION_UPDATED: &str = "transaction.updated";

/// One training row per paid item that asked for training; replays insert nothing
const INSERT_PAID_TRAININGS: &str = r#"
    INSERT INTO trainings (order_item_id, product_id, patronista_id, cliente_id)
    SELECT oi.id, oi.product_id, oi.patronista_id, o.cliente_id
    FROM order_items oi
    JOIN orders o ON o.id = oi.order_id
    WHERE oi.order_id = $1 AND oi.include_training = true
    ON CONFLICT (order_item_id) DO NOTHING
"#;

/// Payment service
#[derive(Clone)]
pub struct PaymentService {
    db: PgPool,
    config: Arc<Config>,
}

/// What the webhook did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event type we do not handle
    Ignored,
    /// Same transaction status already recorded
    Duplicate,
    /// No order matches the transaction
    UnknownOrder,
    Applied(StatusChange),
}

/// Public checkout settings for the storefront
#[derive(Debug, Serialize)]
pub struct PaymentConfigResponse {
    pub public_key: String,
    pub currency: String,
    pub redirect_url: String,
}

#[derive(Debug, sqlx::FromRow)]
struct LockedOrder {
    status: String,
    total: Decimal,
}

impl PaymentService {
    /// Create a new PaymentService instance
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Settings the storefront needs to open the Wompi checkout
    pub fn public_config(&self) -> PaymentConfigResponse {
        PaymentConfigResponse {
            public_key: self.config.wompi.public_key.clone(),
            currency: self.config.wompi.currency.clone(),
            redirect_url: self.config.wompi.redirect_url.clone(),
        }
    }

    /// Parse and verify a raw event body. Missing or wrong signatures fail
    /// with `InvalidSignature`.
    pub fn parse_event(&self, body: &[u8]) -> AppResult<WompiEvent> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| AppError::ValidationError(format!("Invalid event body: {}", e)))?;

        if value.get("signature").is_none() {
            return Err(AppError::InvalidSignature);
        }

        let event: WompiEvent = serde_json::from_value(value)
            .map_err(|e| AppError::ValidationError(format!("Invalid event: {}", e)))?;

        event.verify(&self.config.wompi.events_secret)?;
        Ok(event)
    }

    /// Process a verified event
    pub async fn handle_event(&self, event: &WompiEvent) -> AppResult<WebhookOutcome> {
        if event.event != TRANSACTION_UPDATED {
            tracing::debug!(event = %event.event, "Ignoring Wompi event");
            return Ok(WebhookOutcome::Ignored);
        }

        let transaction = event.transaction()?;
        tracing::info!(
            transaction_id = %transaction.id,
            status = transaction.status.as_str(),
            environment = event.environment.as_deref().unwrap_or("unknown"),
            "Wompi transaction event"
        );
        let payload = serde_json::to_value(&event.data)
            .map_err(|e| AppError::Internal(format!("Cannot store event payload: {}", e)))?;

        let mut tx = self.db.begin().await?;

        let order_id = Self::find_order(&mut tx, &transaction).await?;

        let recorded = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO payment_events (order_id, wompi_transaction_id, event_type, transaction_status, payload)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (wompi_transaction_id, transaction_status) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(order_id)
        .bind(&transaction.id)
        .bind(&event.event)
        .bind(transaction.status.as_str())
        .bind(&payload)
        .fetch_optional(&mut *tx)
        .await?;

        let order_id = match event_target(recorded.is_some(), order_id) {
            Ok(order_id) => order_id,
            Err(outcome) => {
                tx.commit().await?;
                match outcome {
                    WebhookOutcome::Duplicate => {
                        tracing::info!(transaction_id = %transaction.id, "Duplicate Wompi event")
                    }
                    _ => tracing::warn!(
                        transaction_id = %transaction.id,
                        reference = ?transaction.reference,
                        "Wompi event for unknown order"
                    ),
                }
                return Ok(outcome);
            }
        };

        let change = Self::apply_transaction_status(&mut tx, order_id, &transaction).await?;
        tx.commit().await?;

        Ok(WebhookOutcome::Applied(change))
    }

    /// Locate the order of a transaction: payment link first, then reference
    async fn find_order(
        conn: &mut PgConnection,
        transaction: &WompiTransaction,
    ) -> AppResult<Option<Uuid>> {
        if let Some(link_id) = transaction.payment_link_id.as_deref() {
            let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM orders WHERE payment_link_id = $1")
                .bind(link_id)
                .fetch_optional(&mut *conn)
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }

        match transaction.reference.as_deref() {
            Some(reference) => Ok(sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM orders WHERE reference = $1",
            )
            .bind(reference)
            .fetch_optional(&mut *conn)
            .await?),
            None => Ok(None),
        }
    }

    /// Move an order to the status implied by a Wompi transaction.
    ///
    /// Runs inside the caller's transaction and holds the order row lock until
    /// it commits. Same-status updates are no-ops; transitions the status
    /// machine forbids are logged and skipped.
    pub async fn apply_transaction_status(
        conn: &mut PgConnection,
        order_id: Uuid,
        transaction: &WompiTransaction,
    ) -> AppResult<StatusChange> {
        let order = sqlx::query_as::<_, LockedOrder>(
            "SELECT status, total FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let current: OrderStatus = order.status.parse()?;
        let expected = to_amount_in_cents(order.total)?;

        match settle(current, transaction.status, transaction.amount_in_cents, expected) {
            Settlement::Unchanged => Ok(StatusChange::Unchanged),
            Settlement::Skip { from, to } => {
                tracing::warn!(
                    order_id = %order_id,
                    transaction_id = %transaction.id,
                    from = %from,
                    to = %to,
                    "Skipping order status update"
                );
                Ok(StatusChange::Unchanged)
            }
            Settlement::AmountMismatch { expected, received } => {
                tracing::warn!(
                    order_id = %order_id,
                    expected,
                    received,
                    "Approved amount does not match order total"
                );
                Ok(StatusChange::Unchanged)
            }
            Settlement::MarkPaid => {
                sqlx::query(
                    r#"
                    UPDATE orders
                    SET status = 'paid', paid_at = NOW(), wompi_transaction_id = $2, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(order_id)
                .bind(&transaction.id)
                .execute(&mut *conn)
                .await?;

                let trainings = sqlx::query(INSERT_PAID_TRAININGS)
                    .bind(order_id)
                    .execute(&mut *conn)
                    .await?;

                tracing::info!(
                    order_id = %order_id,
                    transaction_id = %transaction.id,
                    trainings = trainings.rows_affected(),
                    "Order paid"
                );
                Ok(StatusChange::Changed { from: current, to: OrderStatus::Paid })
            }
            Settlement::SetStatus(next) => {
                sqlx::query(
                    r#"
                    UPDATE orders
                    SET status = $2, wompi_transaction_id = $3, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(order_id)
                .bind(next.as_str())
                .bind(&transaction.id)
                .execute(&mut *conn)
                .await?;

                tracing::info!(order_id = %order_id, status = %next, "Order status updated");
                Ok(StatusChange::Changed { from: current, to: next })
            }
        }
    }
}

/// Order an event should be applied to, or why it stops here. A replayed
/// event is a duplicate even when its order is unknown.
fn event_target(newly_recorded: bool, order_id: Option<Uuid>) -> Result<Uuid, WebhookOutcome> {
    match (newly_recorded, order_id) {
        (false, _) => Err(WebhookOutcome::Duplicate),
        (true, None) => Err(WebhookOutcome::UnknownOrder),
        (true, Some(order_id)) => Ok(order_id),
    }
}
