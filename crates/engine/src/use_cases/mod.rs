//! Use cases - the engine's user stories.
//!
//! - `events` turns gateway events into store writes and queued jobs
//! - `sync` does the same for a whole posted tree
//! - `jobs` runs queued jobs through the generators
//! - `construction` turns job payloads into world commands
//! - `queries` answers the REST read endpoints
//! - `store_retry` retries upserts that lost a race for a unique slot

pub mod construction;
pub mod events;
pub mod jobs;
pub mod queries;
mod store_retry;
pub mod sync;

pub use construction::{BuildPhase, BuildPlan, ConstructionError, Generators};
pub use events::{EventConsumer, IngestError, Ingested};
pub use jobs::{JobOutcome, JobRecovery, JobWorker, Reconciled, RetryPolicy, WorkerError};
pub use queries::{QueryError, WorldQueries};
pub use sync::{SyncError, SyncUseCase};
