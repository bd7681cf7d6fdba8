//! Guildcraft Engine library.
//!
//! Everything between the chat gateway and the world server.
//!
//! ## Structure
//!
//! - `use_cases/` - event ingestion, sync, the job worker, generators, queries
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

/// Test fixtures module for unit and integration tests.
#[cfg(test)]
pub mod test_fixtures;

pub use app::App;
