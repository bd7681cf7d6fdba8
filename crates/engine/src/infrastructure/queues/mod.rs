//! Queue implementations - Infrastructure adapters for the job queue port

mod memory_queue;

pub use memory_queue::InMemoryJobQueue;
