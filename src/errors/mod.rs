//! Error handling module for the menu backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use std::future::Future;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const INVALID_SELECTION: &str = "INVALID_SELECTION";
    pub const UPSTREAM_UNAVAILABLE: &str = "UPSTREAM_UNAVAILABLE";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Message shown to the end user for any navigation failure.
pub const NAVIGATION_ERROR_TEXT: &str = "Navigation error, please try again";

/// Message shown to the end user when a collaborator is down.
pub const UPSTREAM_FAILURE_TEXT: &str = "Service temporarily unavailable, please try again later";

/// Application error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Referenced node, user, question or content is absent
    NotFound(String),
    /// Duplicate name, duplicate user, second root, node still has children
    Conflict(String),
    /// Index out of range against a captured list, malformed action token
    InvalidSelection(String),
    /// Store or notification channel error or timeout
    UpstreamUnavailable(String),
    /// Malformed input
    Validation(String),
    /// Unparseable request
    BadRequest(String),
    /// Internal server error
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidSelection(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Conflict(_) => codes::CONFLICT,
            AppError::InvalidSelection(_) => codes::INVALID_SELECTION,
            AppError::UpstreamUnavailable(_) => codes::UPSTREAM_UNAVAILABLE,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Get the detailed error message.
    pub fn message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidSelection(msg)
            | AppError::UpstreamUnavailable(msg)
            | AppError::Validation(msg)
            | AppError::BadRequest(msg)
            | AppError::Internal(msg) => msg.clone(),
        }
    }

    /// The message that may be shown to an end user.
    ///
    /// Expected failures surface their specific text. Navigation failures collapse
    /// to one generic notice and upstream failures never leak their detail.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidSelection(_) => NAVIGATION_ERROR_TEXT.to_string(),
            AppError::UpstreamUnavailable(_) | AppError::Internal(_) => {
                UPSTREAM_FAILURE_TEXT.to_string()
            }
            other => other.message(),
        }
    }

    /// Whether this is an expected, user-caused failure that is not logged as an error.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            AppError::UpstreamUnavailable(_) | AppError::Internal(_)
        )
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return AppError::Conflict(format!("Duplicate record: {}", db_err.message()));
            }
        }
        tracing::error!("Database error: {:?}", err);
        AppError::UpstreamUnavailable(format!("Database error: {}", err))
    }
}

impl From<tantivy::TantivyError> for AppError {
    fn from(err: tantivy::TantivyError) -> Self {
        tracing::error!("Search error: {:?}", err);
        AppError::Internal(format!("Search error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("Notification channel error: {:?}", err);
        AppError::UpstreamUnavailable(format!("Notification channel error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

/// Await an outbound call with a bounded timeout.
///
/// Elapsed calls become `UpstreamUnavailable`; nothing is retried here.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("{} timed out after {:?}", what, limit);
            Err(AppError::UpstreamUnavailable(format!(
                "{} timed out after {:?}",
                what, limit
            )))
        }
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.public_message(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_expected() {
            tracing::debug!("Request failed: {}", self);
        } else {
            tracing::error!("Request failed: {}", self);
        }
        let status = self.status_code();
        let body = ErrorResponse::new(&self);
        (status, Json(body)).into_response()
    }
}
