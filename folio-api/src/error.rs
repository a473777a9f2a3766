//! Error Types for FOLIO API
//!
//! `ApiError` is the JSON body every failed request returns. `ErrorCode`
//! picks the status, and `From<FolioError>` decides which code a domain
//! failure becomes.
//!
//! Token and throttling failures use fixed wording so responses never reveal
//! whether an account exists.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use folio_core::{
    AuthError, ConflictError, FolioError, NotFoundError, StorageError, ThrottleError,
    UpstreamError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{EXPIRED_TOKEN_MESSAGE, GENERIC_THROTTLE_MESSAGE, GENERIC_TOKEN_MESSAGE};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (400, 401)
    // ========================================================================
    /// Credentials did not match
    Unauthorized,

    /// Single-use token is unknown, consumed or tampered with
    InvalidToken,

    /// Single-use token was genuine but its lifetime has passed
    TokenExpired,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// Requested document has no versions
    DocumentNotFound,

    /// Requested version does not exist
    VersionNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Entity with the same identifier already exists
    EntityAlreadyExists,

    /// Concurrent modification detected
    ConcurrentModification,

    // ========================================================================
    // Upstream Errors (502, 503, 504)
    // ========================================================================
    /// External compute provider failed
    UpstreamFailed,

    /// No provider is registered for the requested capability
    ProviderNotConfigured,

    /// Operation timed out
    Timeout,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Backing store is unavailable
    ServiceUnavailable,

    // ========================================================================
    // Throttling (429)
    // ========================================================================
    /// Request rate limit exceeded or account temporarily locked
    TooManyRequests,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,

            ErrorCode::InvalidToken
            | ErrorCode::TokenExpired
            | ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound
            | ErrorCode::DocumentNotFound
            | ErrorCode::VersionNotFound => StatusCode::NOT_FOUND,

            ErrorCode::EntityAlreadyExists | ErrorCode::ConcurrentModification => {
                StatusCode::CONFLICT
            }

            ErrorCode::UpstreamFailed => StatusCode::BAD_GATEWAY,
            ErrorCode::ProviderNotConfigured | ErrorCode::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Invalid credentials",
            ErrorCode::InvalidToken => GENERIC_TOKEN_MESSAGE,
            ErrorCode::TokenExpired => EXPIRED_TOKEN_MESSAGE,
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::DocumentNotFound => "Document not found",
            ErrorCode::VersionNotFound => "Version not found",
            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::ConcurrentModification => "Concurrent modification detected",
            ErrorCode::UpstreamFailed => "Upstream provider failed",
            ErrorCode::ProviderNotConfigured => "Capability not available",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::TooManyRequests => GENERIC_THROTTLE_MESSAGE,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Seconds until the caller may retry; sent as a `Retry-After` header.
    #[serde(skip)]
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after_secs: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized() -> Self {
        Self::from_code(ErrorCode::Unauthorized)
    }

    /// Same response for unknown, consumed and tampered tokens.
    pub fn invalid_token() -> Self {
        Self::from_code(ErrorCode::InvalidToken)
    }

    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityNotFound, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a TooManyRequests error with a retry hint.
    pub fn too_many_requests(retry_after_secs: u64) -> Self {
        let mut err = Self::from_code(ErrorCode::TooManyRequests)
            .with_details(serde_json::json!({ "retry_after_secs": retry_after_secs }));
        err.retry_after_secs = Some(retry_after_secs);
        err
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs;
        let mut response = (status, Json(self)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<FolioError> for ApiError {
    fn from(err: FolioError) -> Self {
        match err {
            FolioError::Validation(inner) => ApiError::validation_failed(inner.to_string()),

            FolioError::Throttled(inner) => match inner {
                ThrottleError::RateLimited {
                    retry_after_secs, ..
                }
                | ThrottleError::AccountLocked { retry_after_secs } => {
                    ApiError::too_many_requests(retry_after_secs.max(1))
                }
            },

            FolioError::NotFound(NotFoundError::Token) => ApiError::invalid_token(),
            FolioError::Expired(_) => ApiError::token_expired(),
            FolioError::NotFound(NotFoundError::Subject) => ApiError::not_found("Not found"),
            FolioError::NotFound(inner @ NotFoundError::Document { .. }) => {
                ApiError::new(ErrorCode::DocumentNotFound, inner.to_string())
            }
            FolioError::NotFound(inner @ NotFoundError::Version { .. }) => {
                ApiError::new(ErrorCode::VersionNotFound, inner.to_string())
            }

            FolioError::Upstream(inner) => match inner {
                UpstreamError::Timeout { .. } => {
                    ApiError::new(ErrorCode::Timeout, inner.to_string())
                }
                UpstreamError::ProviderNotConfigured { .. } => {
                    ApiError::new(ErrorCode::ProviderNotConfigured, inner.to_string())
                }
                UpstreamError::BatchIncomplete { failed, total } => {
                    ApiError::new(ErrorCode::UpstreamFailed, inner.to_string()).with_details(
                        serde_json::json!({ "failed": failed, "total": total }),
                    )
                }
                other => {
                    tracing::warn!(error = %other, "Upstream provider error");
                    ApiError::from_code(ErrorCode::UpstreamFailed)
                }
            },

            FolioError::Conflict(inner) => match inner {
                ConflictError::VersionTaken { .. } | ConflictError::AppendRetriesExhausted { .. } => {
                    ApiError::new(ErrorCode::ConcurrentModification, inner.to_string())
                }
                ConflictError::DuplicateSubject => {
                    ApiError::from_code(ErrorCode::EntityAlreadyExists)
                }
                ConflictError::DuplicateToken => {
                    tracing::error!("Token hash collision");
                    ApiError::from_code(ErrorCode::InternalError)
                }
            },

            FolioError::Storage(inner) => {
                tracing::error!(error = %inner, "Storage error");
                match inner {
                    StorageError::Unavailable { .. } => {
                        ApiError::from_code(ErrorCode::ServiceUnavailable)
                    }
                    StorageError::Serialization { .. } | StorageError::LockPoisoned => {
                        ApiError::from_code(ErrorCode::InternalError)
                    }
                }
            }

            FolioError::Auth(AuthError::InvalidCredentials) => ApiError::unauthorized(),
            FolioError::Auth(inner @ AuthError::HashingFailed { .. }) => {
                tracing::error!(error = %inner, "Credential hashing failed");
                ApiError::from_code(ErrorCode::InternalError)
            }

            FolioError::Config(inner) => {
                tracing::error!(error = %inner, "Configuration error");
                ApiError::from_code(ErrorCode::InternalError)
            }
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("JSON error: {}", err))
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// TESTS
// ============================================================================
