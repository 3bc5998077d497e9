//! Domain rule violations

use thiserror::Error;

/// Errors raised by the pure business rules in this crate
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Cannot move order from {from} to {to}")]
    InvalidOrderTransition { from: String, to: String },

    #[error("Cannot move training from {from} to {to}")]
    InvalidTrainingTransition { from: String, to: String },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product {0} appears more than once in the cart")]
    DuplicateCartLine(uuid::Uuid),

    #[error("Product {0} does not offer training")]
    TrainingNotOffered(uuid::Uuid),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown value '{value}' for {kind}")]
    UnknownVariant { kind: &'static str, value: String },
}
