//! Order lifecycle and payment amount tests
//!
//! Property-based and unit tests for:
//! - Order status transitions driven by Wompi events and polling
//! - Conversion between prices and Wompi amounts in cents
//! - Gateway references and signature payloads

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    event_checksum_payload, from_amount_in_cents, generate_order_reference,
    integrity_signature_payload, settle, to_amount_in_cents, OrderStatus, Settlement,
    StatusChange, WompiTransactionStatus,
};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Property Test Strategies
// ============================================================================

fn order_status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Pending),
        Just(OrderStatus::Paid),
        Just(OrderStatus::Failed),
        Just(OrderStatus::Cancelled),
    ]
}

fn wompi_status_strategy() -> impl Strategy<Value = WompiTransactionStatus> {
    prop_oneof![
        Just(WompiTransactionStatus::Pending),
        Just(WompiTransactionStatus::Approved),
        Just(WompiTransactionStatus::Declined),
        Just(WompiTransactionStatus::Voided),
        Just(WompiTransactionStatus::Error),
    ]
}

// ============================================================================
// Order Status Lifecycle
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Delivering the same status twice never changes the order again
    #[test]
    fn replayed_status_is_unchanged(status in order_status_strategy()) {
        prop_assert_eq!(status.apply(status), Ok(StatusChange::Unchanged));
    }

    /// A paid order keeps its status whatever the gateway reports later
    #[test]
    fn paid_orders_never_leave_paid(event in wompi_status_strategy()) {
        let next = OrderStatus::from_wompi(event);
        let result = OrderStatus::Paid.apply(next);

        if next == OrderStatus::Paid {
            prop_assert_eq!(result, Ok(StatusChange::Unchanged));
        } else {
            prop_assert!(result.is_err(), "paid -> {} must be rejected", next);
        }
    }

    /// apply() and can_transition_to() agree on every pair
    #[test]
    fn apply_matches_transition_table(
        from in order_status_strategy(),
        to in order_status_strategy(),
    ) {
        prop_assume!(from != to);
        let result = from.apply(to);

        if from.can_transition_to(to) {
            prop_assert_eq!(result, Ok(StatusChange::Changed { from, to }));
        } else {
            prop_assert!(result.is_err());
        }
    }

    /// Terminal orders accept no further transitions
    #[test]
    fn terminal_orders_are_closed(
        from in order_status_strategy(),
        to in order_status_strategy(),
    ) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
    }
}

#[test]
fn test_pending_order_follows_gateway() {
    let approved = OrderStatus::from_wompi(WompiTransactionStatus::Approved);
    assert_eq!(
        OrderStatus::Pending.apply(approved),
        Ok(StatusChange::Changed {
            from: OrderStatus::Pending,
            to: OrderStatus::Paid
        })
    );

    let declined = OrderStatus::from_wompi(WompiTransactionStatus::Declined);
    assert_eq!(
        OrderStatus::Pending.apply(declined),
        Ok(StatusChange::Changed {
            from: OrderStatus::Pending,
            to: OrderStatus::Failed
        })
    );
}

#[test]
fn test_cancelled_order_ignores_late_approval() {
    assert!(OrderStatus::Cancelled.apply(OrderStatus::Paid).is_err());
}

#[test]
fn test_order_status_parse() {
    assert_eq!(OrderStatus::from_str("paid"), Ok(OrderStatus::Paid));
    assert!(OrderStatus::from_str("refunded").is_err());
    assert_eq!(OrderStatus::Cancelled.to_string(), "cancelled");
}

// ============================================================================
// Settlement against Gateway Transactions
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Reporting the status an order already has never touches it
    #[test]
    fn settle_same_status_is_noop(
        event in wompi_status_strategy(),
        amount in 0i64..1_000_000_000,
        expected in 0i64..1_000_000_000,
    ) {
        let current = OrderStatus::from_wompi(event);
        prop_assert_eq!(settle(current, event, amount, expected), Settlement::Unchanged);
    }

    /// Forbidden transitions are skipped, not applied
    #[test]
    fn settle_skips_forbidden_transitions(
        current in order_status_strategy(),
        event in wompi_status_strategy(),
        amount in 0i64..1_000_000_000,
    ) {
        let next = OrderStatus::from_wompi(event);
        prop_assume!(current != next && !current.can_transition_to(next));
        prop_assert_eq!(
            settle(current, event, amount, amount),
            Settlement::Skip { from: current, to: next }
        );
    }

    /// An approval for a different amount never marks the order paid
    #[test]
    fn settle_rejects_amount_mismatch(
        current in prop_oneof![Just(OrderStatus::Pending), Just(OrderStatus::Failed)],
        expected in 1i64..1_000_000_000,
        delta in prop_oneof![-1_000_000i64..0, 1i64..1_000_000],
    ) {
        let received = expected + delta;
        prop_assert_eq!(
            settle(current, WompiTransactionStatus::Approved, received, expected),
            Settlement::AmountMismatch { expected, received }
        );
    }

    /// An approval for the exact total pays an open order
    #[test]
    fn settle_marks_paid_on_exact_amount(
        current in prop_oneof![Just(OrderStatus::Pending), Just(OrderStatus::Failed)],
        expected in 0i64..1_000_000_000,
    ) {
        prop_assert_eq!(
            settle(current, WompiTransactionStatus::Approved, expected, expected),
            Settlement::MarkPaid
        );
    }

    /// Non-approval outcomes ignore the amount
    #[test]
    fn settle_other_statuses_ignore_amount(
        event in prop_oneof![
            Just(WompiTransactionStatus::Declined),
            Just(WompiTransactionStatus::Error),
            Just(WompiTransactionStatus::Voided),
        ],
        amount in 0i64..1_000_000_000,
        expected in 0i64..1_000_000_000,
    ) {
        let next = OrderStatus::from_wompi(event);
        prop_assert_eq!(
            settle(OrderStatus::Pending, event, amount, expected),
            Settlement::SetStatus(next)
        );
    }
}

#[test]
fn test_paid_order_ignores_late_decline() {
    assert_eq!(
        settle(OrderStatus::Paid, WompiTransactionStatus::Declined, 100, 100),
        Settlement::Skip {
            from: OrderStatus::Paid,
            to: OrderStatus::Failed
        }
    );
}

#[test]
fn test_failed_order_moves_back_to_pending() {
    assert_eq!(
        settle(OrderStatus::Failed, WompiTransactionStatus::Pending, 0, 100),
        Settlement::SetStatus(OrderStatus::Pending)
    );
}

// ============================================================================
// Amounts in Cents
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Whole peso prices become exactly price * 100 cents
    #[test]
    fn whole_prices_scale_by_hundred(pesos in 0i64..1_000_000_000) {
        prop_assert_eq!(to_amount_in_cents(Decimal::from(pesos)), Ok(pesos * 100));
    }

    /// Half a cent always rounds up
    #[test]
    fn half_cents_round_up(cents in 0i64..1_000_000_000) {
        let amount = Decimal::new(cents * 10 + 5, 3);
        prop_assert_eq!(to_amount_in_cents(amount), Ok(cents + 1));
    }

    /// Stored cents read back as the same two-decimal amount
    #[test]
    fn cents_survive_conversion(cents in 0i64..1_000_000_000_000) {
        prop_assert_eq!(to_amount_in_cents(from_amount_in_cents(cents)), Ok(cents));
    }

    /// Negative amounts are never sent to the gateway
    #[test]
    fn negative_amounts_rejected(cents in 1i64..1_000_000_000) {
        prop_assert!(to_amount_in_cents(Decimal::new(-cents, 2)).is_err());
    }
}

// ============================================================================
// References and Signatures
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// References are "PAT-" followed by 12 uppercase hex digits of the order id
    #[test]
    fn order_reference_format(bytes in any::<[u8; 16]>()) {
        let id = Uuid::from_bytes(bytes);
        let reference = generate_order_reference(id);

        prop_assert_eq!(reference.len(), 16);
        prop_assert!(reference.starts_with("PAT-"));
        prop_assert!(reference[4..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        prop_assert_eq!(
            reference[4..].to_lowercase(),
            id.simple().to_string()[..12].to_string()
        );
    }

    /// The integrity payload ends with the secret and embeds the amount
    #[test]
    fn integrity_payload_layout(
        reference in "PAT-[0-9A-F]{12}",
        cents in 0i64..1_000_000_000,
    ) {
        let payload = integrity_signature_payload(&reference, cents, "COP", "integrity");
        prop_assert_eq!(payload, format!("{}{}COPintegrity", reference, cents));
    }
}

#[test]
fn test_event_checksum_payload_order() {
    let values = vec![
        "tx-99".to_string(),
        "DECLINED".to_string(),
        "1500000".to_string(),
    ];
    assert_eq!(
        event_checksum_payload(&values, 1_700_000_000, "events"),
        "tx-99DECLINED15000001700000000events"
    );
    assert_eq!(event_checksum_payload(&[], 1, "s"), "1s");
}
