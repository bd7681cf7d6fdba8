//! Job processing: the worker loop and startup reconciliation.

mod recovery;
mod worker;

pub use recovery::{JobRecovery, Reconciled};
pub use worker::{JobOutcome, JobWorker, RetryPolicy, WorkerError};

use guildcraft_domain::Job;

use crate::infrastructure::ports::JobQueue;

/// Push every job's envelope, in order. Returns how many made it.
///
/// A job that cannot be pushed is logged and left Pending in the store;
/// startup reconciliation re-enqueues it.
pub async fn enqueue_all(queue: &dyn JobQueue, jobs: &[Job]) -> usize {
    let mut pushed = 0;
    for job in jobs {
        let envelope = match job.envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to build job envelope");
                continue;
            }
        };
        match queue.push(&envelope).await {
            Ok(()) => pushed += 1,
            Err(e) => tracing::error!(
                job_id = %job.id,
                job_type = %job.job_type(),
                error = %e,
                "Failed to enqueue job, leaving it pending for reconciliation"
            ),
        }
    }
    pushed
}
