//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - The world store (SQLite today)
//! - The job queue (SQLite or in-memory)
//! - The world command backend (RCON)
//! - Clock (for testing)

mod error;
mod external;
mod repos;
mod testing;
pub mod types;

// =============================================================================
// Repository Ports
// =============================================================================
pub use repos::WorldStore;

pub use types::{
    Archived, GroupUpsert, GroupUpserted, GroupWithMembers, MemberMatch, MemberUpdate,
    MemberUpdated, MemberUpsert, MemberUpserted, StatusCounts,
};

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{CommandConnection, CommandConnector, CommandSink, JobQueue};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use external::{MockCommandSink, MockJobQueue};
#[cfg(test)]
pub use repos::MockWorldStore;
#[cfg(test)]
pub use testing::MockClockPort;

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::ClockPort;

// =============================================================================
// Error Types
// =============================================================================
pub use error::{CommandError, QueueError, RepoError};
