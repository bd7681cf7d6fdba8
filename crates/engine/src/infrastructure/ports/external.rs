//! External service port traits (job queue, world command backend).

use async_trait::async_trait;
use guildcraft_domain::JobEnvelope;

use super::error::{CommandError, QueueError};

// =============================================================================
// Job Queue
// =============================================================================

/// The single FIFO between the event consumer and the worker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append at the back.
    async fn push(&self, envelope: &JobEnvelope) -> Result<(), QueueError>;
    /// Take from the front, `None` when empty.
    async fn pop(&self) -> Result<Option<JobEnvelope>, QueueError>;
    async fn depth(&self) -> Result<usize, QueueError>;
    async fn clear(&self) -> Result<(), QueueError>;
}

// =============================================================================
// World Command Backend
// =============================================================================

/// What generators talk to: send a command, get the backend's reply.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: String) -> Result<String, CommandError>;

    /// Send every command back to back and pay the rate-limit delay once.
    async fn send_batch(&self, commands: Vec<String>) -> Result<Vec<String>, CommandError>;
}

/// One open connection to the backend.
#[async_trait]
pub trait CommandConnection: Send {
    async fn execute(&mut self, command: &str) -> Result<String, CommandError>;
    async fn close(&mut self) -> Result<(), CommandError>;
}

/// Opens connections on demand.
#[async_trait]
pub trait CommandConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn CommandConnection>, CommandError>;
}
