//! HTTP handlers for the Patronaje marketplace API

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod categories;
pub mod dashboard;
pub mod files;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;
pub mod trainings;

pub use health::{health_check, liveness, root};
