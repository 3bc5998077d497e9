//! Error handling for the Patronaje marketplace
//!
//! Provides consistent error responses in English and Spanish

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::DomainError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
        message_es: String,
    },

    #[error("Forbidden: {message}")]
    Forbidden {
        message: String,
        message_es: String,
    },

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_es: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Conflict: {message}")]
    Conflict {
        resource: String,
        message: String,
        message_es: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // External service errors
    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a field validation error
    pub fn validation(field: &str, message: &str, message_es: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
            message_es: message_es.to_string(),
        }
    }

    /// Map a unique-constraint violation to `DuplicateEntry`, anything else to `DatabaseError`
    pub fn from_unique_violation(err: sqlx::Error, field: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::DuplicateEntry(field.to_string())
            }
            _ => AppError::DatabaseError(err),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidOrderTransition { .. }
            | DomainError::InvalidTrainingTransition { .. } => {
                AppError::InvalidStateTransition(err.to_string())
            }
            DomainError::EmptyCart => AppError::validation("items", &err.to_string(), "El carrito está vacío"),
            DomainError::DuplicateCartLine(_) => AppError::validation(
                "items",
                &err.to_string(),
                "Un producto aparece más de una vez en el carrito",
            ),
            DomainError::TrainingNotOffered(_) => AppError::validation(
                "include_training",
                &err.to_string(),
                "El producto no ofrece capacitación",
            ),
            DomainError::InvalidAmount(_) | DomainError::UnknownVariant { .. } => {
                AppError::ValidationError(err.to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<&str> = field_errors.keys().copied().collect();
        fields.sort_unstable();

        match fields.first() {
            Some(field) => {
                let message = field_errors
                    .get(field)
                    .and_then(|errs| errs.first())
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("Invalid value for {}", field));
                AppError::Validation {
                    field: field.to_string(),
                    message,
                    message_es: format!("Valor inválido para {}", field),
                }
            }
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_es: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: &str, message_en: impl Into<String>, message_es: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message_en: message_en.into(),
            message_es: message_es.into(),
            field: None,
        }
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new(
                    "INVALID_CREDENTIALS",
                    "Invalid email or password",
                    "Correo o contraseña incorrectos",
                ),
            ),
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("TOKEN_EXPIRED", "Token has expired", "El token ha expirado"),
            ),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_TOKEN", "Invalid token", "Token inválido"),
            ),
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action",
                    "No tienes permiso para realizar esta acción",
                ),
            ),
            AppError::Unauthorized { message, message_es } => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", message.clone(), message_es.clone()),
            ),
            AppError::Forbidden { message, message_es } => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new("FORBIDDEN", message.clone(), message_es.clone()),
            ),
            AppError::Validation { field, message, message_es } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone(), message_es.clone())
                    .with_field(field.clone()),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new(
                    "VALIDATION_ERROR",
                    msg.clone(),
                    format!("Datos inválidos: {}", msg),
                ),
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "DUPLICATE_ENTRY",
                    format!("A record with this {} already exists", field),
                    format!("Ya existe un registro con este {}", field),
                )
                .with_field(field.clone()),
            ),
            AppError::Conflict { resource, message, message_es } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("CONFLICT", message.clone(), message_es.clone())
                    .with_field(resource.clone()),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new(
                    "NOT_FOUND",
                    format!("{} not found", resource),
                    format!("No se encontró {}", resource),
                ),
            ),
            AppError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorDetail::new(
                    "PAYLOAD_TOO_LARGE",
                    msg.clone(),
                    "El archivo supera el tamaño permitido",
                ),
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "INVALID_STATE_TRANSITION",
                    msg.clone(),
                    format!("No se puede cambiar el estado: {}", msg),
                ),
            ),
            AppError::PaymentGateway(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new(
                    "PAYMENT_GATEWAY_ERROR",
                    format!("Payment gateway error: {}", msg),
                    "Error con la pasarela de pagos",
                ),
            ),
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new(
                    "INVALID_SIGNATURE",
                    "Invalid event signature",
                    "Firma del evento inválida",
                ),
            ),
            AppError::StorageError(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new(
                    "STORAGE_ERROR",
                    "File storage is unavailable",
                    "El almacenamiento de archivos no está disponible",
                ),
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "CONFIGURATION_ERROR",
                    format!("Configuration error: {}", msg),
                    "Error de configuración",
                ),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "DATABASE_ERROR",
                    "A database error occurred",
                    "Ocurrió un error en la base de datos",
                ),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone(), "Error interno del servidor"),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    "An internal server error occurred",
                    "Error interno del servidor",
                ),
            ),
        };

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
