//! Error handling for the CRUD/authorization core.
//!
//! This module provides:
//! - Machine-readable error codes for API responses
//! - HTTP status code mapping (401/403/404 for the authorization taxonomy)
//! - Localized message maps in the response body
//! - Backend failures carried unchanged as error sources
//!
//! Authorization failures are raised at the point of check and never
//! downgraded to empty results; the one exception is the explicitly
//! configured lenient list mode in the router, which substitutes an empty
//! page for a list-level deny.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CrudError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic
/// error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication/Authorization (4000-4099)
    Unauthenticated,
    Forbidden,

    // Entity errors (2000-2099)
    ItemNotFound,

    // Validation errors (4100-4199)
    ValidationError,

    // Collaborator errors (5000-5099)
    BackendFailure,
    SerializationError,
    ConfigurationError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::ItemNotFound => StatusCode::NOT_FOUND,
            Self::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BackendFailure
            | Self::SerializationError
            | Self::ConfigurationError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable string form used in response bodies.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::ItemNotFound => "ITEM_NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::BackendFailure => "BACKEND_FAILURE",
            Self::SerializationError => "SERIALIZATION_ERROR",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The error type for all core operations.
///
/// Backend (data-access, key-value) failures are carried as sources and
/// never wrapped with retries; what the collaborator raised is what the
/// caller sees.
#[derive(Debug, Error)]
pub enum CrudError {
    /// No or invalid credentials.
    #[error("authentication required")]
    Unauthenticated,

    /// Authenticated, but no scope or ownership covers the action.
    /// Always names the resource path and action.
    #[error("not authorized to {action} {resource_path}")]
    Forbidden {
        resource_path: String,
        action: String,
    },

    /// Entity absent, or present under a different tenant.
    #[error("{kind} not found: {uid}")]
    NotFound { kind: String, uid: String },

    /// Invalid caller-supplied input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A collaborator I/O failure, propagated unchanged.
    #[error("backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Record or document (de)serialization failure.
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Startup-time configuration failure.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CrudError {
    /// Create an unauthenticated error.
    pub fn unauthenticated() -> Self {
        Self::Unauthenticated
    }

    /// Create a forbidden error naming the resource path and action.
    pub fn forbidden(resource_path: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Forbidden {
            resource_path: resource_path.into(),
            action: action.into(),
        }
    }

    /// Create a not found error for an entity kind and id.
    pub fn not_found(kind: impl Into<String>, uid: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            uid: uid.into(),
        }
    }

    /// Wrap a collaborator failure without altering it.
    pub fn backend<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(source))
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthenticated => ErrorCode::Unauthenticated,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::NotFound { .. } => ErrorCode::ItemNotFound,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Backend(_) => ErrorCode::BackendFailure,
            Self::Serialization(_) => ErrorCode::SerializationError,
            Self::Config(_) => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code().http_status()
    }

    /// Localized, client-safe message map.
    ///
    /// Only an English message is produced here; hosts may merge in
    /// additional languages before responding.
    pub fn messages(&self) -> HashMap<&'static str, String> {
        let en = match self {
            Self::Unauthenticated => "Authentication credentials are required".to_string(),
            Self::Forbidden {
                resource_path,
                action,
            } => format!("You are not authorized to {action} {resource_path}"),
            Self::NotFound { kind, .. } => format!("{kind} not found"),
            Self::Validation(detail) => detail.clone(),
            Self::Backend(_) | Self::Serialization(_) | Self::Config(_) => {
                "An internal error occurred".to_string()
            }
        };
        HashMap::from([("en", en)])
    }
}

impl From<redis::RedisError> for CrudError {
    fn from(e: redis::RedisError) -> Self {
        Self::backend(e)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP Response Mapping
// ═══════════════════════════════════════════════════════════════════════════════

/// Wire shape of an error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub error: String,
    /// Localized message map keyed by language tag.
    pub message: HashMap<String, String>,
    /// Human-readable detail (not localized).
    pub detail: String,
}

impl IntoResponse for CrudError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = code.http_status();

        if status.is_server_error() {
            warn!(code = %code, error = %self, "request failed");
        }
        counter!("crudgate_errors_total", "code" => code.as_str()).increment(1);

        let body = ErrorBody {
            error: code.as_str().to_string(),
            message: self
                .messages()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            detail: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CrudError::unauthenticated().http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            CrudError::forbidden("ns/svc/files", "read").http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            CrudError::not_found("file", "f1").http_status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_forbidden_names_resource_and_action() {
        let err = CrudError::forbidden("media/api/files", "delete");
        let detail = err.to_string();
        assert!(detail.contains("media/api/files"));
        assert!(detail.contains("delete"));
    }

    #[test]
    fn test_messages_localized_map() {
        let err = CrudError::not_found("file", "f1");
        let messages = err.messages();
        assert_eq!(messages.get("en"), Some(&"file not found".to_string()));
    }

    #[test]
    fn test_backend_source_preserved() {
        let redis_err = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        let err = CrudError::from(redis_err);
        assert_eq!(err.code(), ErrorCode::BackendFailure);
        assert!(std::error::Error::source(&err).is_some());
    }
}
