//! Error types for port operations.

/// Repository operation errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Entity not found - includes entity type and ID for actionable error messages.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Uniqueness or reference constraint violated.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl RepoError {
    /// Create a NotFound error with entity type and ID context.
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a Serialization error.
    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    /// Create a ConstraintViolation error.
    pub fn constraint(message: impl ToString) -> Self {
        Self::ConstraintViolation(message.to_string())
    }
}

/// Broker transport errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker connection is closed")]
    ConnectionClosed,

    #[error("Channel is closed")]
    ChannelClosed,

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Unknown delivery tag {0}")]
    UnknownDelivery(u64),

    #[error("Channel is already consuming from {0}")]
    AlreadyConsuming(String),

    #[error("Channel has no active consumer")]
    NotConsuming,

    #[error("Broker backend error in {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },
}

impl BrokerError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn backend(operation: &'static str, message: impl ToString) -> Self {
        Self::Backend {
            operation,
            message: message.to_string(),
        }
    }
}

/// Failure to hand an event to the realtime hub.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("Realtime hub unavailable: {0}")]
    Unavailable(String),
}
