//! Route definitions for the Patronaje marketplace

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::services::storage::MAX_FILES_PER_REQUEST;
use crate::{handlers, middleware::auth_middleware, AppState};

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create API routes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .nest("/auth", account_routes())
        .nest("/products", product_routes(state))
        .nest("/orders", order_routes())
        .nest("/files", file_routes())
        .nest("/trainings", training_routes())
        .nest("/dashboard", dashboard_routes())
        .nest("/admin", admin_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (public)
        .nest("/auth", auth_routes())
        // Catalog (public)
        .nest("/catalog", catalog_routes())
        // Wompi events and checkout settings (public)
        .route("/payments/webhook", post(handlers::payments::webhook))
        .route("/payments/config", get(handlers::payments::payment_config))
        // Signed download links carry their own authorization
        .route("/files/signed/:token", get(handlers::files::download_signed))
        .merge(protected)
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/logout", post(handlers::auth::logout))
}

/// Own account routes (protected)
fn account_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/me",
            get(handlers::auth::me).put(handlers::auth::update_me),
        )
        .route("/me/password", put(handlers::auth::change_password))
}

/// Catalog routes (public)
fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(handlers::catalog::list_products))
        .route("/products/:product_id", get(handlers::catalog::get_product))
        .route(
            "/products/:product_id/thumbnail",
            get(handlers::catalog::get_thumbnail),
        )
        .route("/categories", get(handlers::catalog::list_categories))
        .route(
            "/patronistas/:patronista_id",
            get(handlers::catalog::get_patronista),
        )
}

/// Product management routes (protected)
fn product_routes(state: &AppState) -> Router<AppState> {
    let file_limit = state.storage.max_upload_bytes();

    // Each file is checked against the per-file limit after parsing
    let uploads = Router::new()
        .route(
            "/:product_id/files",
            post(handlers::products::upload_files),
        )
        .layer(DefaultBodyLimit::max(
            file_limit * MAX_FILES_PER_REQUEST + MULTIPART_OVERHEAD,
        ));

    let thumbnail = Router::new()
        .route(
            "/:product_id/thumbnail",
            post(handlers::products::upload_thumbnail),
        )
        .layer(DefaultBodyLimit::max(file_limit + MULTIPART_OVERHEAD));

    Router::new()
        .route(
            "/",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/:product_id",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        )
        .route(
            "/:product_id/files/:file_id",
            delete(handlers::products::delete_file),
        )
        .merge(uploads)
        .merge(thumbnail)
}

/// Order routes (protected)
fn order_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route("/:order_id", get(handlers::orders::get_order))
        .route("/:order_id/status", get(handlers::orders::get_order_status))
        .route(
            "/:order_id/payment-link",
            post(handlers::orders::regenerate_payment_link),
        )
        .route("/:order_id/cancel", post(handlers::orders::cancel_order))
}

/// Download routes (protected)
fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/purchased", get(handlers::files::purchased_files))
        .route("/:file_id/download", get(handlers::files::download_file))
        .route("/:file_id/link", post(handlers::files::create_download_link))
}

/// Training routes (protected)
fn training_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::trainings::list_trainings))
        .route(
            "/:training_id/schedule",
            put(handlers::trainings::schedule_training),
        )
        .route(
            "/:training_id/complete",
            post(handlers::trainings::complete_training),
        )
        .route(
            "/:training_id/cancel",
            post(handlers::trainings::cancel_training),
        )
}

/// Dashboard routes (protected)
fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/patronista", get(handlers::dashboard::patronista_dashboard))
        .route("/cliente", get(handlers::dashboard::cliente_dashboard))
        .route("/admin", get(handlers::dashboard::admin_dashboard))
}

/// Admin routes (protected, admin role checked per handler)
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(handlers::admin::list_users))
        .route("/users/:user_id/role", put(handlers::admin::update_user_role))
        .route(
            "/users/:user_id/status",
            put(handlers::admin::update_user_status),
        )
        .route("/orders", get(handlers::admin::list_orders))
        .route(
            "/products/:product_id/status",
            put(handlers::admin::update_product_status),
        )
        .route(
            "/categories",
            get(handlers::categories::list_categories).post(handlers::categories::create_category),
        )
        .route(
            "/categories/:category_id",
            put(handlers::categories::update_category).delete(handlers::categories::delete_category),
        )
}
