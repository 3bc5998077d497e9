//! Cart pricing rules
//!
//! The storefront keeps the cart in local storage; the server re-prices every
//! line from the database with these same rules before creating an order.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// A priced cart line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartLine {
    pub product_id: Uuid,
    pub unit_price: Decimal,
    pub include_training: bool,
    /// Price of the training add-on, `None` when the product offers none
    pub training_price: Option<Decimal>,
}

impl CartLine {
    /// Pattern price plus the training add-on when requested
    pub fn subtotal(&self) -> Result<Decimal, DomainError> {
        if !self.include_training {
            return Ok(self.unit_price);
        }
        match self.training_price {
            Some(training) => Ok(self.unit_price + training),
            None => Err(DomainError::TrainingNotOffered(self.product_id)),
        }
    }
}

/// Validate the cart and compute its total
pub fn cart_total(lines: &[CartLine]) -> Result<Decimal, DomainError> {
    if lines.is_empty() {
        return Err(DomainError::EmptyCart);
    }

    let mut seen = HashSet::with_capacity(lines.len());
    let mut total = Decimal::ZERO;
    for line in lines {
        if !seen.insert(line.product_id) {
            return Err(DomainError::DuplicateCartLine(line.product_id));
        }
        total += line.subtotal()?;
    }
    Ok(total)
}
