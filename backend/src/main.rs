//! Patronaje Marketplace - Backend Server
//!
//! Marketplace where patronistas sell digital sewing patterns, optionally
//! bundled with personalized training, and clientes pay through Wompi.

use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod external;
mod handlers;
mod middleware;
mod routes;
mod services;

pub use config::Config;

use external::WompiClient;
use services::FileStorage;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub wompi: WompiClient,
    pub storage: FileStorage,
}

impl AppState {
    pub fn new(db: sqlx::PgPool, config: Config) -> Self {
        let wompi = WompiClient::new(&config.wompi);
        let storage = FileStorage::new(&config.storage);
        Self {
            db,
            config: Arc::new(config),
            wompi,
            storage,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading RUST_LOG
    dotenvy::dotenv().ok();

    // Initialize tracing; LOG_FORMAT=json switches to structured output
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "patronaje_server=debug,tower_http=debug,sqlx=warn".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Patronaje Marketplace Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.is_development() {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    // Create application state
    let state = AppState::new(db_pool, config);
    state.storage.ensure_root().await?;

    // Build application
    let app = create_app(state);

    // Start server
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::liveness))
        .nest("/api/v1", routes::api_routes(&state))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use crate::services::storage::MAX_FILES_PER_REQUEST;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let config = Config::for_tests();
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .unwrap();
        create_app(AppState::new(db, config))
    }

    fn token_for(role: shared::UserRole) -> String {
        let config = Config::for_tests();
        let now = chrono::Utc::now().timestamp();
        let claims = crate::services::auth::Claims {
            sub: uuid::Uuid::new_v4().to_string(),
            email: format!("{}@example.com", role.as_str()),
            role,
            exp: now + 600,
            iat: now,
        };
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(config.jwt.secret.as_bytes()),
        )
        .unwrap()
    }

    fn multipart_upload(files: &[Vec<u8>]) -> (String, Vec<u8>) {
        let boundary = "patronaje-test-boundary";
        let mut body = Vec::new();
        for (i, bytes) in files.iter().enumerate() {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"molde-{}.pdf\"\r\nContent-Type: application/pdf\r\n\r\n",
                    boundary, i
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        (format!("multipart/form-data; boundary={}", boundary), body)
    }

    async fn upload(files: &[Vec<u8>]) -> axum::response::Response {
        let (content_type, body) = multipart_upload(files);
        test_app()
            .oneshot(
                Request::post(format!("/api/v1/products/{}/files", uuid::Uuid::new_v4()))
                    .header(header::AUTHORIZATION, format!("Bearer {}", token_for(shared::UserRole::Patronista)))
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_and_liveness() {
        let response = test_app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = test_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let response = test_app()
            .oneshot(Request::get("/api/v1/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert!(body["error"]["message_es"].is_string());
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let response = test_app()
            .oneshot(
                Request::get("/api/v1/auth/me")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_role_guard_runs_before_database() {
        let token = token_for(shared::UserRole::Cliente);

        let response = test_app()
            .oneshot(
                Request::get("/api/v1/dashboard/admin")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["error"]["code"],
            "INSUFFICIENT_PERMISSIONS"
        );
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let event = serde_json::json!({
            "event": "transaction.updated",
            "data": {"transaction": {"id": "tx-1", "status": "APPROVED", "amount_in_cents": 100}},
            "signature": {"properties": ["transaction.id"], "checksum": "deadbeef"},
            "timestamp": 1700000000
        });

        let response = test_app()
            .oneshot(
                Request::post("/api/v1/payments/webhook")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(event.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "INVALID_SIGNATURE");
    }

    #[tokio::test]
    async fn test_upload_accepts_several_files_under_per_file_limit() {
        // Test config allows 1 MiB per file
        let file = vec![b'%'; 600 * 1024];
        let response = upload(&[file.clone()]).await;
        assert_ne!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = upload(&[file.clone(), file]).await;
        assert_ne!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_upload_rejects_too_many_files() {
        let files = vec![b"%PDF-1.4".to_vec(); MAX_FILES_PER_REQUEST + 1];
        let response = upload(&files).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["field"], "file");
    }

    #[tokio::test]
    async fn test_payment_config_is_public() {
        let response = test_app()
            .oneshot(
                Request::get("/api/v1/payments/config")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["currency"], "COP");
        assert_eq!(body["public_key"], "pub_test_key");
    }

    #[tokio::test]
    async fn test_invalid_signed_link_is_forbidden() {
        let response = test_app()
            .oneshot(
                Request::get("/api/v1/files/signed/bm9wZQ.bm9wZQ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
