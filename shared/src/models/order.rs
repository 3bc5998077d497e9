//! Order models and the order status lifecycle

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::payment::WompiTransactionStatus;

/// Status of an order
///
/// ```text
/// pending ──► paid
///    │  ▲
///    │  └──── failed ──► paid
///    ├──────► failed
///    └──────► cancelled
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

/// Outcome of applying a status to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// The order already had this status
    Unchanged,
    Changed { from: OrderStatus, to: OrderStatus },
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Failed) | (Pending, Cancelled) | (Failed, Pending) | (Failed, Paid)
        )
    }

    /// Apply a new status. Re-applying the current status is a no-op so that
    /// webhook replays and polling can both deliver the same result.
    pub fn apply(self, next: OrderStatus) -> Result<StatusChange, DomainError> {
        if self == next {
            return Ok(StatusChange::Unchanged);
        }
        if self.can_transition_to(next) {
            Ok(StatusChange::Changed { from: self, to: next })
        } else {
            Err(DomainError::InvalidOrderTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }

    /// Order status implied by a gateway transaction status
    pub fn from_wompi(status: WompiTransactionStatus) -> Self {
        match status {
            WompiTransactionStatus::Pending => OrderStatus::Pending,
            WompiTransactionStatus::Approved => OrderStatus::Paid,
            WompiTransactionStatus::Declined | WompiTransactionStatus::Error => OrderStatus::Failed,
            WompiTransactionStatus::Voided => OrderStatus::Cancelled,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::UnknownVariant {
                kind: "order status",
                value: other.to_string(),
            }),
        }
    }
}

/// What a reported gateway transaction does to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The order already has the reported status
    Unchanged,
    /// The status machine forbids the move; the report is ignored
    Skip { from: OrderStatus, to: OrderStatus },
    /// Approved, but not for the order total
    AmountMismatch { expected: i64, received: i64 },
    MarkPaid,
    SetStatus(OrderStatus),
}

/// Decide how an order settles against a gateway transaction.
/// `expected_cents` is the order total in cents.
pub fn settle(
    current: OrderStatus,
    reported: WompiTransactionStatus,
    amount_in_cents: i64,
    expected_cents: i64,
) -> Settlement {
    let next = OrderStatus::from_wompi(reported);
    match current.apply(next) {
        Ok(StatusChange::Unchanged) => Settlement::Unchanged,
        Err(_) => Settlement::Skip { from: current, to: next },
        Ok(StatusChange::Changed { .. }) if next == OrderStatus::Paid => {
            if amount_in_cents == expected_cents {
                Settlement::MarkPaid
            } else {
                Settlement::AmountMismatch {
                    expected: expected_cents,
                    received: amount_in_cents,
                }
            }
        }
        Ok(StatusChange::Changed { .. }) => Settlement::SetStatus(next),
    }
}

/// A customer order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub cliente_id: Uuid,
    /// Reference shared with the payment gateway (e.g. "PAT-1A2B3C4D5E6F")
    pub reference: String,
    pub status: OrderStatus,
    pub total: Decimal,
    pub currency: String,
    pub checkout_url: Option<String>,
    pub wompi_transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_title: String,
    pub patronista_id: Uuid,
    pub unit_price: Decimal,
    pub include_training: bool,
    pub training_price: Option<Decimal>,
    pub subtotal: Decimal,
}

/// Generate the gateway reference for an order
pub fn generate_order_reference(order_id: Uuid) -> String {
    let hex = order_id.simple().to_string().to_uppercase();
    format!("PAT-{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Failed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_paid_is_final() {
        for next in [OrderStatus::Pending, OrderStatus::Failed, OrderStatus::Cancelled] {
            assert!(OrderStatus::Paid.apply(next).is_err());
        }
        assert_eq!(
            OrderStatus::Paid.apply(OrderStatus::Paid),
            Ok(StatusChange::Unchanged)
        );
    }

    #[test]
    fn test_failed_order_can_retry_or_be_approved_late() {
        assert_eq!(
            OrderStatus::Failed.apply(OrderStatus::Pending),
            Ok(StatusChange::Changed {
                from: OrderStatus::Failed,
                to: OrderStatus::Pending
            })
        );
        assert!(OrderStatus::Failed.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_wompi_status_mapping() {
        assert_eq!(OrderStatus::from_wompi(WompiTransactionStatus::Approved), OrderStatus::Paid);
        assert_eq!(OrderStatus::from_wompi(WompiTransactionStatus::Declined), OrderStatus::Failed);
        assert_eq!(OrderStatus::from_wompi(WompiTransactionStatus::Error), OrderStatus::Failed);
        assert_eq!(OrderStatus::from_wompi(WompiTransactionStatus::Voided), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from_wompi(WompiTransactionStatus::Pending), OrderStatus::Pending);
    }

    #[test]
    fn test_settle_pending_order() {
        use WompiTransactionStatus::*;
        assert_eq!(settle(OrderStatus::Pending, Approved, 100, 100), Settlement::MarkPaid);
        assert_eq!(
            settle(OrderStatus::Pending, Approved, 99, 100),
            Settlement::AmountMismatch { expected: 100, received: 99 }
        );
        assert_eq!(
            settle(OrderStatus::Pending, Declined, 100, 100),
            Settlement::SetStatus(OrderStatus::Failed)
        );
        assert_eq!(settle(OrderStatus::Pending, Pending, 100, 100), Settlement::Unchanged);
    }

    #[test]
    fn test_order_reference_format() {
        let id = Uuid::parse_str("1a2b3c4d-5e6f-7081-92a3-b4c5d6e7f809").unwrap();
        assert_eq!(generate_order_reference(id), "PAT-1A2B3C4D5E6F");
    }
}
