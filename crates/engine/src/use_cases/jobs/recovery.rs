//! Startup reconciliation between the job table and the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::infrastructure::ports::{ClockPort, JobQueue, WorldStore};

use super::{enqueue_all, WorkerError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// InProgress jobs interrupted by a previous shutdown.
    pub reset: u64,
    /// Pending jobs pushed onto the fresh queue.
    pub requeued: usize,
}

/// Rebuilds the queue from the job table, which is authoritative.
pub struct JobRecovery {
    store: Arc<dyn WorldStore>,
    queue: Arc<dyn JobQueue>,
    clock: Arc<dyn ClockPort>,
}

impl JobRecovery {
    pub fn new(
        store: Arc<dyn WorldStore>,
        queue: Arc<dyn JobQueue>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
        }
    }

    /// Run before the worker starts. Jobs left InProgress for longer than
    /// `stale_after` go back to Pending, the queue is emptied, and every
    /// Pending job is pushed again oldest first, so nothing is lost or
    /// delivered twice.
    pub async fn reconcile(&self, stale_after: Duration) -> Result<Reconciled, WorkerError> {
        let now = self.clock.now();
        let cutoff = chrono::Duration::from_std(stale_after)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let reset = self.store.reset_stale_jobs(cutoff).await?;
        self.queue.clear().await?;
        let pending = self.store.list_pending_jobs().await?;
        let requeued = enqueue_all(self.queue.as_ref(), &pending).await;

        if reset > 0 || requeued > 0 {
            tracing::info!(reset, requeued, "Reconciled job queue");
        } else {
            tracing::debug!("Job queue already consistent");
        }
        Ok(Reconciled { reset, requeued })
    }
}
