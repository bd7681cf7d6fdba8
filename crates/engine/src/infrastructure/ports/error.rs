//! Error types for port operations.

use std::time::Duration;

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

    /// A uniqueness or state constraint rejected the write. Callers may
    /// recompute a slot and try again.
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

    /// Check if this is a NotFound error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }
}

impl From<guildcraft_domain::DomainError> for RepoError {
    fn from(e: guildcraft_domain::DomainError) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue database error: {0}")]
    Database(String),
    #[error("Queue serialization error: {0}")]
    Serialization(String),
}

impl From<guildcraft_domain::DomainError> for QueueError {
    fn from(e: guildcraft_domain::DomainError) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Failures talking to the world backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandError {
    #[error("Connection to {addr} failed: {message}")]
    Connect { addr: String, message: String },
    #[error("Command backend rejected the password")]
    Auth,
    #[error("Command I/O failed: {0}")]
    Io(String),
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
    #[error("Command protocol error: {0}")]
    Protocol(String),
    /// Refused locally before anything was sent. Retrying cannot help.
    #[error("Command rejected: {0}")]
    Rejected(String),
}

impl CommandError {
    /// Whether a fresh connection might make the command succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Auth | Self::Rejected(_))
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
