//! Payment gateway (Wompi) types and money conversion

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Default marketplace currency
pub const DEFAULT_CURRENCY: &str = "COP";

/// Transaction status reported by Wompi
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum WompiTransactionStatus {
    Pending,
    Approved,
    Declined,
    Voided,
    Error,
}

impl WompiTransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WompiTransactionStatus::Pending => "PENDING",
            WompiTransactionStatus::Approved => "APPROVED",
            WompiTransactionStatus::Declined => "DECLINED",
            WompiTransactionStatus::Voided => "VOIDED",
            WompiTransactionStatus::Error => "ERROR",
        }
    }
}

impl std::str::FromStr for WompiTransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(WompiTransactionStatus::Pending),
            "APPROVED" => Ok(WompiTransactionStatus::Approved),
            "DECLINED" => Ok(WompiTransactionStatus::Declined),
            "VOIDED" => Ok(WompiTransactionStatus::Voided),
            "ERROR" => Ok(WompiTransactionStatus::Error),
            _ => Err(DomainError::UnknownVariant {
                kind: "transaction status",
                value: s.to_string(),
            }),
        }
    }
}

/// Convert a price in currency units to the integer cents Wompi expects.
/// Rounds half away from zero at the second decimal.
pub fn to_amount_in_cents(amount: Decimal) -> Result<i64, DomainError> {
    if amount.is_sign_negative() {
        return Err(DomainError::InvalidAmount(format!("{} is negative", amount)));
    }
    let cents = (amount * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    cents
        .to_i64()
        .ok_or_else(|| DomainError::InvalidAmount(format!("{} is out of range", amount)))
}

/// Convert integer cents back to a two-decimal amount
pub fn from_amount_in_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Concatenation hashed for the web-checkout integrity signature:
/// reference + amount_in_cents + currency + integrity secret
pub fn integrity_signature_payload(
    reference: &str,
    amount_in_cents: i64,
    currency: &str,
    integrity_secret: &str,
) -> String {
    format!("{}{}{}{}", reference, amount_in_cents, currency, integrity_secret)
}

/// Concatenation hashed for event checksums:
/// the signed property values in order, then the timestamp, then the events secret
pub fn event_checksum_payload(values: &[String], timestamp: i64, events_secret: &str) -> String {
    let mut payload = values.concat();
    payload.push_str(&timestamp.to_string());
    payload.push_str(events_secret);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_amount_in_cents() {
        assert_eq!(to_amount_in_cents(Decimal::from(45000)), Ok(4_500_000));
        assert_eq!(to_amount_in_cents(Decimal::from_str("19999.99").unwrap()), Ok(1_999_999));
        assert_eq!(to_amount_in_cents(Decimal::from_str("0.005").unwrap()), Ok(1));
        assert!(to_amount_in_cents(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_from_amount_in_cents() {
        assert_eq!(from_amount_in_cents(4_500_050), Decimal::from_str("45000.50").unwrap());
    }

    #[test]
    fn test_transaction_status_parse_is_case_insensitive() {
        assert_eq!(
            WompiTransactionStatus::from_str("approved"),
            Ok(WompiTransactionStatus::Approved)
        );
        assert!(WompiTransactionStatus::from_str("REFUNDED").is_err());
    }

    #[test]
    fn test_signature_payloads() {
        assert_eq!(
            integrity_signature_payload("PAT-ABC", 4_500_000, "COP", "secret"),
            "PAT-ABC4500000COPsecret"
        );
        let values = vec!["1234-1610641025-49201".to_string(), "APPROVED".to_string(), "4490000".to_string()];
        assert_eq!(
            event_checksum_payload(&values, 1530291411, "evt_secret"),
            "1234-1610641025-49201APPROVED44900001530291411evt_secret"
        );
    }
}
