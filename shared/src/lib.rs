//! Shared types and business rules for the Patronaje marketplace
//!
//! This crate contains the domain types used by the backend API and the
//! WASM helpers the storefront loads for its local-storage cart.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
