use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Machine-readable error category carried in every error envelope.
///
/// Lets clients tell validation problems apart from provider outages
/// without parsing the free-text `error` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Signature,
    Upstream,
    Database,
    Internal,
    RateLimited,
}

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (missing or invalid input).
    BadRequest(String),
    /// Error interacting with an external provider (Stripe, Twilio, Anthropic).
    ExternalApiError(String),
    /// Internal server error.
    InternalError(String),
    /// Webhook signature missing, malformed or not matching.
    InvalidSignature(String),
    /// A provider whose credentials are not set; carries the provider name.
    NotConfigured(&'static str),
    /// Caller exceeded the per-IP request rate; retry after `wait_secs`.
    RateLimited { wait_secs: u64 },
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// The structured category of this error, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::DatabaseError(_) => ErrorKind::Database,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::BadRequest(_) => ErrorKind::Validation,
            AppError::ExternalApiError(_) => ErrorKind::Upstream,
            AppError::InternalError(_) | AppError::NotConfigured(_) => ErrorKind::Internal,
            AppError::InvalidSignature(_) => ErrorKind::Signature,
            AppError::RateLimited { .. } => ErrorKind::RateLimited,
            AppError::WithContext { source, .. } => source.kind(),
        }
    }

    /// HTTP status for this error: 400, 404 or 500, plus 429 from the rate limiter.
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Signature => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Upstream | ErrorKind::Database | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message that is safe to return to the caller.
    ///
    /// Client errors carry their own description; server-side failures are
    /// reduced to a generic message so provider internals never leak.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotFound(msg) | AppError::BadRequest(msg) => msg.clone(),
            AppError::InvalidSignature(_) => "Webhook signature verification failed".to_string(),
            AppError::DatabaseError(_) => "Database error".to_string(),
            AppError::ExternalApiError(_) => "External service error".to_string(),
            AppError::InternalError(_) => "Internal server error".to_string(),
            AppError::NotConfigured(provider) => format!("{} not configured", provider),
            AppError::RateLimited { wait_secs } => {
                format!("Too many requests, retry in {}s", wait_secs)
            }
            AppError::WithContext { source, .. } => source.public_message(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::InvalidSignature(msg) => write!(f, "Invalid signature: {}", msg),
            AppError::NotConfigured(provider) => write!(f, "{} not configured", provider),
            AppError::RateLimited { wait_secs } => write!(f, "Rate limited for {}s", wait_secs),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

/// Error envelope shared by every route: `{success: false, error, kind}`.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub kind: ErrorKind,
}

impl IntoResponse for AppError {
    /// Maps the error to its status code and envelope.
    /// Server-side failures are logged with full detail before being reduced.
    fn into_response(self) -> Response {
        match &self {
            AppError::DatabaseError(e) => tracing::error!("Database error: {:?}", e),
            AppError::ExternalApiError(msg) => tracing::error!("External API error: {}", msg),
            AppError::InternalError(msg) => tracing::error!("Internal error: {}", msg),
            AppError::NotConfigured(provider) => {
                tracing::error!("{} credentials are not configured", provider)
            }
            AppError::InvalidSignature(msg) => {
                tracing::warn!("Rejected webhook signature: {}", msg)
            }
            AppError::WithContext { .. } if self.status().is_server_error() => {
                tracing::error!("Error with context: {}", self)
            }
            AppError::WithContext { .. } => tracing::debug!("Client error: {}", self),
            AppError::NotFound(_) | AppError::BadRequest(_) | AppError::RateLimited { .. } => {}
        }

        let body = Json(ErrorEnvelope {
            success: false,
            error: self.public_message(),
            kind: self.kind(),
        });

        (self.status(), body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApiError(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: f(),
        })
    }
}
