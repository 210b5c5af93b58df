use crate::error::DatabaseErrorConverter;
use thiserror::Error;
use uuid::Uuid;

/// Application-wide error type covering both the ambient failures (storage,
/// configuration, validation) and the settlement-domain taxonomy
/// (insufficient credits, full classes, gateway outcomes, reconciliation).
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error with entity, field, and value information
    #[error("Resource not found: {entity} with {field}={value}")]
    NotFound {
        entity: String,
        field: String,
        value: String,
    },

    /// Duplicate entry error for unique constraint violations
    #[error("Duplicate entry: {entity}.{field} = '{value}' already exists")]
    Duplicate {
        entity: String,
        field: String,
        value: String,
    },

    /// Validation error with field-specific details
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Bad request error with descriptive message
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Unprocessable content error with descriptive message
    #[error("Unprocessable content: {message}")]
    UnprocessableContent { message: String },

    /// The user's credit balance cannot cover the requested debit.
    /// The balance is left untouched when this is returned.
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: i64, available: i64 },

    /// The class has no remaining seats for the requested attendee count.
    #[error("Class {class_id} is full")]
    ClassFull { class_id: Uuid },

    /// Transient gateway failure (network, 5xx, rate limit). Callers inside
    /// the engine retry these with bounded backoff before giving up.
    #[error("Gateway error (retryable): {message}")]
    GatewayRetryable { message: String },

    /// Non-retryable gateway rejection (4xx). Surfaced immediately after
    /// compensation.
    #[error("Gateway rejected the request: {message}")]
    GatewayPermanent { message: String },

    /// Retry budget exhausted on a retryable gateway failure.
    #[error("Payment failed: {message}")]
    PaymentFailed { message: String },

    /// Duplicate or out-of-order settlement event. Logged and ignored,
    /// never surfaced to webhook callers.
    #[error("Reconciliation conflict: {message}")]
    ReconciliationConflict { message: String },

    /// A rollback step itself failed. Requires manual reconciliation.
    #[error("Compensation failed during {context}")]
    CompensationFailure {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// Database operation error with operation context
    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration error with key information
    #[error("Configuration error: {key}")]
    Configuration {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Connection pool error
    #[error("Connection pool error")]
    ConnectionPool {
        #[source]
        source: anyhow::Error,
    },

    /// Internal error for unexpected failures
    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal { source: error }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(error: diesel::result::Error) -> Self {
        DatabaseErrorConverter::convert_diesel_error(error, "database operation")
    }
}

impl From<bb8::RunError<diesel_async::pooled_connection::PoolError>> for AppError {
    fn from(error: bb8::RunError<diesel_async::pooled_connection::PoolError>) -> Self {
        AppError::ConnectionPool {
            source: anyhow::Error::from(error),
        }
    }
}

impl From<diesel_async::pooled_connection::PoolError> for AppError {
    fn from(error: diesel_async::pooled_connection::PoolError) -> Self {
        AppError::ConnectionPool {
            source: anyhow::Error::from(error),
        }
    }
}

impl From<crate::config::error::ConfigError> for AppError {
    fn from(error: crate::config::error::ConfigError) -> Self {
        AppError::Configuration {
            key: "settings".to_string(),
            source: anyhow::Error::from(error),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "request".to_string());
        AppError::Validation {
            field,
            reason: errors.to_string(),
        }
    }
}

/// Type alias for Result with AppError to simplify function signatures
pub type AppResult<T> = Result<T, AppError>;
