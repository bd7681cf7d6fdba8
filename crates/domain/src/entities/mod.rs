//! Persisted domain entities.

mod group;
mod job;
mod member;

pub use group::{Group, GroupSummary};
pub use job::{truncate_error, Job, JobStatus, JobType, MAX_ERROR_LEN};
pub use member::Member;
