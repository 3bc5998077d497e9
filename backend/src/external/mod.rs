//! External API integrations

pub mod wompi;

pub use wompi::WompiClient;
