//! Error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::users::Provider;

// ============================================================================
// Structured Database Errors
// ============================================================================

/// Store operation being performed when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseOperation {
    /// Establishing a database connection
    Connect,
    /// Looking up records through an index
    Query,
    /// Creating a record
    Insert,
    /// Updating a record
    Update,
    /// Defining tables and indices
    Migration,
}

impl fmt::Display for DatabaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Query => write!(f, "query"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Migration => write!(f, "migration"),
        }
    }
}

/// Category of database error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseErrorKind {
    /// Failed to establish connection
    ConnectionFailed,
    /// Record not found
    NotFound,
    /// Unique index or record id already taken
    ConstraintViolation,
    /// Query execution failed
    QueryFailed,
    /// Stored data could not be decoded
    TypeConversion,
    /// Operation timed out
    Timeout,
    /// Permission denied
    PermissionDenied,
    /// Other/unknown error
    Other,
}

impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::NotFound => write!(f, "not_found"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::QueryFailed => write!(f, "query_failed"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Timeout => write!(f, "timeout"),
            Self::PermissionDenied => write!(f, "permission_denied"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured database error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    /// The operation being performed when the error occurred
    pub operation: DatabaseOperation,
    /// The category of error
    pub kind: DatabaseErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Additional context (e.g., table or index name)
    pub context: Option<String>,
}

impl DatabaseError {
    /// Create a new database error
    pub fn new(
        operation: DatabaseOperation,
        kind: DatabaseErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a "not found" error
    pub fn not_found(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::new(operation, DatabaseErrorKind::NotFound, message)
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            DatabaseOperation::Connect,
            DatabaseErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a constraint violation error
    pub fn constraint_violation(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::new(operation, DatabaseErrorKind::ConstraintViolation, message)
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::new(
            DatabaseOperation::Query,
            DatabaseErrorKind::QueryFailed,
            message,
        )
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::ConnectionFailed | DatabaseErrorKind::Timeout
        )
    }

    /// Whether a concurrent writer already claimed the id or email
    pub fn is_constraint_violation(&self) -> bool {
        self.kind == DatabaseErrorKind::ConstraintViolation
    }

    /// Add context to an existing error
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Database {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref ctx) = self.context {
            write!(f, " [context: {}]", ctx)?;
        }
        Ok(())
    }
}

impl std::error::Error for DatabaseError {}

/// Result type alias using the service error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the service
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Structured database error with operation context
    #[error("{0}")]
    Database(DatabaseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider id is already registered under a different email
    #[error("Identity conflict: id '{id}' belongs to a record with a different email")]
    IdentityConflict {
        /// Case-folded provider id that matched
        id: String,
    },

    /// Provider profile is missing a required attribute
    #[error("Malformed profile: {0}")]
    MalformedProfile(String),

    /// Provider name is not one this service knows
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Provider is known but has no credentials configured
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(Provider),

    /// OAuth state missing, expired, reused or issued for another provider
    #[error("Invalid OAuth state: {0}")]
    InvalidState(String),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Sign-in rejected
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Not supported error (501)
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// External service error (502)
    #[error("External service error: {0}")]
    External(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Optional error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            status: status.as_u16(),
        }
    }

    /// Create error response with a code
    pub fn with_code(
        status: StatusCode,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            status: status.as_u16(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Error::Config(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::with_code(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    e.to_string(),
                ),
            ),

            Error::Database(ref e) => {
                tracing::error!(
                    operation = %e.operation,
                    kind = %e.kind,
                    context = ?e.context,
                    retriable = e.is_retriable(),
                    "Database error: {}", e.message
                );

                let status = match e.kind {
                    DatabaseErrorKind::NotFound => StatusCode::NOT_FOUND,
                    DatabaseErrorKind::ConstraintViolation => StatusCode::CONFLICT,
                    DatabaseErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };

                let code = format!("DATABASE_{}", e.kind.to_string().to_uppercase());

                // Internal details stay in the log
                let user_message = match e.kind {
                    DatabaseErrorKind::NotFound => "Resource not found",
                    DatabaseErrorKind::ConstraintViolation => {
                        "Operation conflicts with existing data"
                    }
                    DatabaseErrorKind::Timeout => "Database operation timed out",
                    _ => "Database operation failed",
                };

                (status, ErrorResponse::with_code(status, code, user_message))
            }

            Error::Io(e) => {
                tracing::error!("I/O error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "IO_ERROR",
                        "Internal server error",
                    ),
                )
            }

            Error::IdentityConflict { .. } => (
                StatusCode::CONFLICT,
                ErrorResponse::with_code(
                    StatusCode::CONFLICT,
                    "IDENTITY_CONFLICT",
                    "Account is linked to a different email address",
                ),
            ),

            Error::MalformedProfile(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::with_code(StatusCode::BAD_GATEWAY, "MALFORMED_PROFILE", msg),
            ),

            Error::UnsupportedProvider(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::with_code(StatusCode::NOT_FOUND, "UNSUPPORTED_PROVIDER", msg),
            ),

            Error::ProviderNotConfigured(provider) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::with_code(
                    StatusCode::NOT_FOUND,
                    "PROVIDER_NOT_CONFIGURED",
                    format!("Sign-in with {} is not enabled", provider),
                ),
            ),

            Error::InvalidState(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_code(StatusCode::BAD_REQUEST, "INVALID_STATE", msg),
            ),

            Error::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::with_code(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ),

            Error::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                ErrorResponse::with_code(StatusCode::FORBIDDEN, "ACCESS_DENIED", msg),
            ),

            Error::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_code(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ),

            Error::NotSupported(msg) => (
                StatusCode::NOT_IMPLEMENTED,
                ErrorResponse::with_code(StatusCode::NOT_IMPLEMENTED, "NOT_SUPPORTED", msg),
            ),

            Error::External(msg) => {
                tracing::error!("External service error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::with_code(
                        StatusCode::BAD_GATEWAY,
                        "EXTERNAL_ERROR",
                        "Identity provider request failed",
                    ),
                )
            }

            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "Internal server error",
                    ),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<DatabaseError> for Error {
    fn from(err: DatabaseError) -> Self {
        Error::Database(err)
    }
}

// Conversion from surrealdb::Error to DatabaseError
#[cfg(feature = "surrealdb")]
impl From<surrealdb::Error> for DatabaseError {
    fn from(err: surrealdb::Error) -> Self {
        let msg = err.to_string();
        let lower = msg.to_lowercase();

        let (kind, operation) = if lower.contains("already exists")
            || lower.contains("already contains")
            || lower.contains("unique")
            || lower.contains("duplicate")
        {
            (
                DatabaseErrorKind::ConstraintViolation,
                DatabaseOperation::Insert,
            )
        } else if lower.contains("not found") || lower.contains("no record") {
            (DatabaseErrorKind::NotFound, DatabaseOperation::Query)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            (DatabaseErrorKind::Timeout, DatabaseOperation::Query)
        } else if lower.contains("connect") {
            (
                DatabaseErrorKind::ConnectionFailed,
                DatabaseOperation::Connect,
            )
        } else if lower.contains("permission")
            || lower.contains("not allowed")
            || lower.contains("denied")
        {
            (
                DatabaseErrorKind::PermissionDenied,
                DatabaseOperation::Query,
            )
        } else if lower.contains("deserializ") || lower.contains("invalid type") {
            (DatabaseErrorKind::TypeConversion, DatabaseOperation::Query)
        } else if lower.contains("parse") || lower.contains("syntax") {
            (DatabaseErrorKind::QueryFailed, DatabaseOperation::Query)
        } else {
            (DatabaseErrorKind::Other, DatabaseOperation::Query)
        };

        Self::new(operation, kind, msg)
    }
}

#[cfg(feature = "surrealdb")]
impl From<surrealdb::Error> for Error {
    fn from(err: surrealdb::Error) -> Self {
        Error::Database(DatabaseError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_display_with_context() {
        let err = DatabaseError::constraint_violation(
            DatabaseOperation::Insert,
            "Index already contains value",
        )
        .add_context("users.user_by_email");
        let display = err.to_string();
        assert!(display.contains("constraint_violation"));
        assert!(display.contains("insert"));
        assert!(display.contains("[context: users.user_by_email]"));
    }

    #[test]
    fn test_retriable_kinds() {
        assert!(DatabaseError::connection_failed("refused").is_retriable());
        assert!(!DatabaseError::query_failed("syntax").is_retriable());
        assert!(!DatabaseError::not_found(DatabaseOperation::Update, "gone").is_retriable());
    }

    #[test]
    fn test_forbidden_maps_to_access_denied() {
        let response = Error::Forbidden("sign-in rejected".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                Error::Database(DatabaseError::constraint_violation(
                    DatabaseOperation::Insert,
                    "dup",
                )),
                StatusCode::CONFLICT,
            ),
            (
                Error::IdentityConflict { id: "42".to_string() },
                StatusCode::CONFLICT,
            ),
            (
                Error::InvalidState("expired".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::UnsupportedProvider("gitlab".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                Error::External("timeout".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
