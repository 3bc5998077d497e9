//! Domain models for the Patronaje marketplace

mod cart;
mod order;
mod payment;
mod product;
mod training;
mod user;

pub use cart::*;
pub use order::*;
pub use payment::*;
pub use product::*;
pub use training::*;
pub use user::*;
