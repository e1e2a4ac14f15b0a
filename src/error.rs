/// Comprehensive Error Handling Module
///
/// This module provides a unified error handling system for the entire application.
/// It covers:
/// 1. Control Flow Errors (Result-based)
/// 2. Operator/System Errors (HTTP responses with structured context)
/// 3. Custom Error Trait Implementation
/// 4. Domain-Specific Error Types (avoiding ball of mud)
/// 5. Structured Error Logging with Context

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES (Avoiding Ball of Mud)
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
        }
    }
}

impl StdError for ValidationError {}

/// Session store operation errors
#[derive(Debug)]
pub enum StoreError {
    UniqueConstraintViolation(String),
    NotFound(String),
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            StoreError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StoreError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            StoreError::ConnectionPool(msg) => write!(f, "Store connection error: {}", msg),
            StoreError::UnexpectedError(msg) => write!(f, "Store error: {}", msg),
        }
    }
}

impl StdError for StoreError {}

/// Key material and hashing errors
#[derive(Debug, Clone)]
pub enum CryptoError {
    KeyGeneration(String),
    Signing(String),
    Hashing(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::KeyGeneration(msg) => write!(f, "Key generation failed: {}", msg),
            CryptoError::Signing(msg) => write!(f, "Token signing failed: {}", msg),
            CryptoError::Hashing(msg) => write!(f, "Hashing failed: {}", msg),
        }
    }
}

impl StdError for CryptoError {}

/// Authentication and session lifecycle errors
///
/// The externally visible surface of the security engine. Token rejections
/// deliberately collapse into one response class so a caller cannot tell
/// detection from ignorance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    RateLimited,
    TokenExpired,
    TokenInvalid,
    TokenReused,
    MissingToken,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::RateLimited => write!(f, "Rate limit exceeded"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::TokenReused => write!(f, "Token reuse detected"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
        }
    }
}

impl StdError for AuthError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
/// This is used for control flow within the application
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Store(StoreError),
    Crypto(CryptoError),
    Auth(AuthError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Store(e) => write!(f, "{}", e),
            AppError::Crypto(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS (Control Flow Error Conversion)
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        AppError::Crypto(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let error_msg = err.to_string();

        if error_msg.contains("duplicate key") || error_msg.contains("unique constraint") {
            StoreError::UniqueConstraintViolation("Username already registered".to_string())
        } else if error_msg.contains("no rows") {
            StoreError::NotFound("Record not found".to_string())
        } else if error_msg.contains("pool") || error_msg.contains("connect") {
            StoreError::ConnectionPool(error_msg)
        } else {
            StoreError::UnexpectedError(error_msg)
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Store(StoreError::from(err))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING (Operator/System Error Handling)
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking (request ID or trace ID)
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            // Validation errors -> 400 Bad Request
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR".to_string(),
                e.to_string(),
            ),

            // Store errors -> appropriate HTTP status
            AppError::Store(e) => match e {
                StoreError::UniqueConstraintViolation(_) => (
                    StatusCode::CONFLICT,
                    "DUPLICATE_ENTRY".to_string(),
                    e.to_string(),
                ),
                StoreError::NotFound(_) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND".to_string(),
                    e.to_string(),
                ),
                StoreError::ConnectionPool(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE".to_string(),
                    "Store temporarily unavailable".to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR".to_string(),
                    "Store error occurred".to_string(),
                ),
            },

            // Crypto errors -> 500, detail stays server-side
            AppError::Crypto(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CRYPTO_ERROR".to_string(),
                "Internal server error".to_string(),
            ),

            // Authentication errors -> 401 / 429 with non-leaking bodies.
            // All token rejections share one body regardless of whether the
            // token was unknown, expired, or flagged as reuse.
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS".to_string(),
                    "Invalid credentials".to_string(),
                ),
                AuthError::RateLimited => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMITED".to_string(),
                    "Too many requests".to_string(),
                ),
                AuthError::TokenExpired | AuthError::TokenInvalid | AuthError::TokenReused => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_INVALID".to_string(),
                    "Invalid or expired token".to_string(),
                ),
                AuthError::MissingToken => (
                    StatusCode::UNAUTHORIZED,
                    "MISSING_TOKEN".to_string(),
                    "Missing authentication token".to_string(),
                ),
            },

            // Internal errors -> 500 Internal Server Error
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR".to_string(),
                "Internal server error".to_string(),
            ),
        };

        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code,
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %e,
                    "Validation error"
                );
            }
            AppError::Store(StoreError::UniqueConstraintViolation(_)) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %self,
                    "Duplicate entry attempt"
                );
            }
            AppError::Store(e) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    "Store error"
                );
            }
            AppError::Crypto(e) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    "Crypto error"
                );
            }
            AppError::Auth(e) => {
                match e {
                    AuthError::TokenReused => {
                        tracing::warn!(
                            request_id = request_id,
                            error = %e,
                            "Token reuse signal"
                        );
                    }
                    AuthError::RateLimited => {
                        tracing::warn!(
                            request_id = request_id,
                            error = %e,
                            "Rate limit rejection"
                        );
                    }
                    _ => {
                        tracing::warn!(
                            request_id = request_id,
                            error = %e,
                            "Authentication error"
                        );
                    }
                }
            }
            AppError::Internal(msg) => {
                tracing::error!(
                    request_id = request_id,
                    error = %msg,
                    "Internal error"
                );
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Store(e) => match e {
                StoreError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::ConnectionPool(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(e) => match e {
                AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging and debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Validation(_) => {
                tracing::warn!(
                    error = %error,
                    context = ?context,
                    "Validation error"
                );
            }
            AppError::Store(_) => {
                tracing::error!(
                    error = %error,
                    context = ?context,
                    "Store error"
                );
            }
            AppError::Crypto(_) => {
                tracing::error!(
                    error = %error,
                    context = ?context,
                    "Crypto error"
                );
            }
            AppError::Auth(_) => {
                tracing::warn!(
                    error = %error,
                    context = ?context,
                    "Authentication error"
                );
            }
            AppError::Internal(_) => {
                tracing::error!(
                    error = %error,
                    context = ?context,
                    "Internal error"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("username".to_string());
        assert_eq!(err.to_string(), "username is empty");
    }

    #[test]
    fn test_app_error_conversion() {
        let val_err = ValidationError::InvalidFormat("test".to_string());
        let app_err: AppError = val_err.into();
        match app_err {
            AppError::Validation(_) => (),
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn test_token_rejections_share_status_and_body() {
        let reused = AppError::Auth(AuthError::TokenReused);
        let invalid = AppError::Auth(AuthError::TokenInvalid);
        let expired = AppError::Auth(AuthError::TokenExpired);

        let (s1, r1) = ErrorHandler::error_response(&reused, "id");
        let (s2, r2) = ErrorHandler::error_response(&invalid, "id");
        let (s3, r3) = ErrorHandler::error_response(&expired, "id");

        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s1, s2);
        assert_eq!(s2, s3);
        assert_eq!(r1.message, r2.message);
        assert_eq!(r2.message, r3.message);
        assert_eq!(r1.code, "TOKEN_INVALID");
    }

    #[test]
    fn test_rate_limited_maps_to_429() {
        let err = AppError::Auth(AuthError::RateLimited);
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_error_response_creation() {
        let request_id = "test-123".to_string();
        let response = ErrorResponse::new(
            request_id.clone(),
            "Test error".to_string(),
            "TEST_ERROR".to_string(),
            400,
        );

        assert_eq!(response.error_id, request_id);
        assert_eq!(response.code, "TEST_ERROR");
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("test_operation");
        assert_eq!(ctx.operation, "test_operation");
        assert!(ctx.user_id.is_none());

        let ctx_with_user = ctx.with_user_id("user-123".to_string());
        assert_eq!(ctx_with_user.user_id, Some("user-123".to_string()));
    }
}
