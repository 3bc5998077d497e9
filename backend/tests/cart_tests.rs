//! Cart pricing tests
//!
//! The storefront cart is re-priced on the server; these cover the totals
//! and the rejection rules applied before an order is created.

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{cart_total, CartLine, DomainError};
use uuid::Uuid;

/// (pattern price, training price when offered, training requested)
fn line_strategy() -> impl Strategy<Value = (i64, Option<i64>, bool)> {
    (1i64..2_000_000, proptest::option::of(0i64..500_000), any::<bool>())
}

fn to_line((price, training, include): (i64, Option<i64>, bool)) -> CartLine {
    CartLine {
        product_id: Uuid::new_v4(),
        unit_price: Decimal::from(price),
        include_training: include,
        training_price: training.map(Decimal::from),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Total is the sum of each pattern price plus requested training
    #[test]
    fn total_is_sum_of_lines(raw in proptest::collection::vec(line_strategy(), 1..10)) {
        let unpriceable = raw.iter().any(|(_, training, include)| *include && training.is_none());
        let expected: i64 = raw
            .iter()
            .map(|(price, training, include)| {
                if *include { price + training.unwrap_or(0) } else { *price }
            })
            .sum();

        let lines: Vec<CartLine> = raw.into_iter().map(to_line).collect();
        let result = cart_total(&lines);

        if unpriceable {
            prop_assert!(matches!(result, Err(DomainError::TrainingNotOffered(_))));
        } else {
            prop_assert_eq!(result, Ok(Decimal::from(expected)));
        }
    }

    /// The same pattern can only be bought once per order
    #[test]
    fn duplicate_products_rejected(
        raw in proptest::collection::vec(line_strategy(), 1..6),
        dup_index in 0usize..6,
    ) {
        let mut lines: Vec<CartLine> = raw
            .into_iter()
            .map(|(price, training, _)| to_line((price, training, false)))
            .collect();
        let dup = lines[dup_index % lines.len()].clone();
        lines.push(dup);

        prop_assert!(matches!(cart_total(&lines), Err(DomainError::DuplicateCartLine(_))));
    }
}

#[test]
fn test_empty_cart() {
    assert_eq!(cart_total(&[]), Err(DomainError::EmptyCart));
}

#[test]
fn test_free_training_is_allowed() {
    let line = to_line((45_000, Some(0), true));
    assert_eq!(line.subtotal(), Ok(Decimal::from(45_000)));
}
