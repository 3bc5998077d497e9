//! Business logic services for the Patronaje marketplace

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod category;
pub mod dashboard;
pub mod file;
pub mod order;
pub mod payment;
pub mod product;
pub mod storage;
pub mod training;

pub use admin::AdminService;
pub use auth::AuthService;
pub use catalog::CatalogService;
pub use category::CategoryService;
pub use dashboard::DashboardService;
pub use file::FileService;
pub use order::OrderService;
pub use payment::PaymentService;
pub use product::ProductService;
pub use storage::FileStorage;
pub use training::TrainingService;
