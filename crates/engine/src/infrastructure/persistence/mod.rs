//! SQLite persistence adapters
//!
//! One database file holds the world store tables and the job queue.

mod connection;
mod job_queue;
mod world_store;

pub use connection::connect;
pub use job_queue::SqliteJobQueue;
pub use world_store::SqliteWorldStore;
