use thiserror::Error;

#[cfg(feature = "web")]
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Errors surfaced by the analytics service
///
/// Every variant maps onto one HTTP status and renders as a `{message, error?}`
/// JSON body when the `web` feature is enabled.
#[derive(Debug, Error)]
pub enum AppError {
    /// Upload rejected by the size ceiling or the MIME allow-list
    #[error("{0}")]
    UnsupportedFormat(String),

    /// File or user lookup miss
    #[error("{0}")]
    NotFound(String),

    /// Missing or malformed request fields
    #[error("{0}")]
    InvalidInput(String),

    /// Per-user AI quota exhausted for the current window
    #[error("Too many AI requests. Please try again later.")]
    RateLimited,

    /// Text-generation service missing or failing
    #[error("{message}")]
    UpstreamUnavailable {
        message: String,
        cause: Option<String>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// Workbook could not be read or written
    #[error("{message}: {cause}")]
    Spreadsheet { message: String, cause: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn spreadsheet(message: impl Into<String>, cause: impl ToString) -> Self {
        Self::Spreadsheet {
            message: message.into(),
            cause: cause.to_string(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
            cause: None,
        }
    }

    /// Underlying cause reported next to the generic message, if any
    pub fn cause(&self) -> Option<String> {
        match self {
            Self::UpstreamUnavailable { cause, .. } => cause.clone(),
            Self::Spreadsheet { cause, .. } => Some(cause.clone()),
            Self::Io(e) => Some(e.to_string()),
            _ => None,
        }
    }

    /// Message shown to the caller; causes stay in the `error` field
    pub fn message(&self) -> String {
        match self {
            Self::Spreadsheet { message, .. } => message.clone(),
            Self::Io(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(feature = "web")]
impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedFormat(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Spreadsheet { .. } | Self::Storage(_) | Self::Config(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(feature = "web")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        }

        let mut body = serde_json::json!({ "message": self.message() });
        if let Some(cause) = self.cause() {
            body["error"] = serde_json::Value::String(cause);
        }

        (status, Json(body)).into_response()
    }
}
