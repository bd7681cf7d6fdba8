//! The job worker.
//!
//! One loop, one job at a time:
//!
//! ```text
//! pop -> load row -> claim -> build -> complete -> side effects
//!                              |
//!                              +-> retry (delayed re-push) or fail
//! ```
//!
//! The job row is the source of truth. The envelope on the queue only names
//! the job; a re-delivered envelope whose row is no longer Pending is dropped.

use std::sync::Arc;
use std::time::Duration;

use guildcraft_domain::layout::link_targets;
use guildcraft_domain::{
    Group, GroupId, Job, JobEnvelope, JobId, JobPayload, JobStatus, LayoutConfig, LinkEndpoint,
    LinkPayload,
};
use tokio_util::sync::CancellationToken;

use crate::infrastructure::app_settings::WorkerSettings;
use crate::infrastructure::ports::{
    ClockPort, CommandSink, JobQueue, QueueError, RepoError, WorldStore,
};
use crate::use_cases::construction::Generators;

use super::enqueue_all;

/// How often and how patiently a failing job is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per job, the first one included.
    pub max_attempts: u32,
    /// Wait before the first retry. Doubles for each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.retry_base_ms),
        }
    }

    /// Wait before re-delivering a job that has failed `retry_count` times.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] RepoError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// What one call to [`JobWorker::process_next`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Stale or duplicate delivery, nothing run.
    Skipped(JobId),
    Completed {
        job_id: JobId,
        commands: usize,
        /// Jobs created as a consequence, e.g. tracks to other villages.
        follow_ups: usize,
    },
    Retrying {
        job_id: JobId,
        retry_count: u32,
        delay: Duration,
    },
    Failed {
        job_id: JobId,
        retry_count: u32,
    },
}

pub struct JobWorker {
    store: Arc<dyn WorldStore>,
    queue: Arc<dyn JobQueue>,
    sink: Arc<dyn CommandSink>,
    clock: Arc<dyn ClockPort>,
    generators: Generators,
    retry: RetryPolicy,
    idle_poll: Duration,
}

impl JobWorker {
    pub fn new(
        store: Arc<dyn WorldStore>,
        queue: Arc<dyn JobQueue>,
        sink: Arc<dyn CommandSink>,
        clock: Arc<dyn ClockPort>,
        layout: LayoutConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            queue,
            sink,
            clock,
            generators: Generators::new(layout),
            retry,
            idle_poll: Duration::from_millis(500),
        }
    }

    /// Pause between polls while the queue is empty.
    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    /// Process jobs until `cancel` fires. A job already running is finished
    /// first; nothing is marked failed because of a shutdown.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            max_attempts = self.retry.max_attempts,
            idle_poll_ms = self.idle_poll.as_millis() as u64,
            "Job worker started"
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let idle = match self.process_next(&cancel).await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    tracing::error!(error = %e, "Job worker iteration failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_poll) => {}
                }
            }
        }
        tracing::info!("Job worker stopped");
    }

    /// Take one envelope off the queue and see it through. `None` when the
    /// queue was empty.
    pub async fn process_next(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<JobOutcome>, WorkerError> {
        let Some(envelope) = self.queue.pop().await? else {
            return Ok(None);
        };

        let job = match self.store.get_job(envelope.job_id).await? {
            Some(job) if job.status == JobStatus::Pending => job,
            Some(job) => {
                tracing::debug!(job_id = %job.id, status = %job.status, "Dropping stale delivery");
                return Ok(Some(JobOutcome::Skipped(job.id)));
            }
            None => {
                tracing::debug!(job_id = %envelope.job_id, "Dropping delivery for unknown job");
                return Ok(Some(JobOutcome::Skipped(envelope.job_id)));
            }
        };
        if !self.store.claim_job(job.id, self.clock.now()).await? {
            tracing::debug!(job_id = %job.id, "Job was claimed elsewhere");
            return Ok(Some(JobOutcome::Skipped(job.id)));
        }

        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type(),
            attempt = job.retry_count + 1,
            "Running job"
        );
        let outcome = match self.generators.build(&job.payload, self.sink.as_ref()).await {
            Ok(commands) => {
                self.store.complete_job(job.id, self.clock.now()).await?;
                let follow_ups = self.after_success(&job).await?;
                tracing::info!(job_id = %job.id, commands, follow_ups, "Job completed");
                JobOutcome::Completed {
                    job_id: job.id,
                    commands,
                    follow_ups,
                }
            }
            Err(e) => self.after_failure(&job, &e.to_string(), cancel).await?,
        };
        Ok(Some(outcome))
    }

    async fn after_success(&self, job: &Job) -> Result<usize, WorkerError> {
        match &job.payload {
            JobPayload::CreateMember(member) => {
                self.store
                    .mark_member_built(member.member_id, member.x, member.z)
                    .await?;
                Ok(0)
            }
            JobPayload::CreateGroup(group) => self.link_new_group(group.group_id).await,
            JobPayload::UpdateMember(_)
            | JobPayload::CreateLink(_)
            | JobPayload::ArchiveMember(_)
            | JobPayload::ArchiveGroup(_) => Ok(0),
        }
    }

    /// Create tracks from a freshly built village. The set of active villages
    /// is read now, after the village's own job is durably complete.
    async fn link_new_group(&self, group_id: GroupId) -> Result<usize, WorkerError> {
        let Some(group) = self.store.get_group(group_id).await? else {
            return Ok(0);
        };
        if group.is_archived {
            return Ok(0);
        }
        let active: Vec<Group> = self
            .store
            .list_active_groups()
            .await?
            .into_iter()
            .map(|summary| summary.group)
            .collect();

        let now = self.clock.now();
        let topology = self.generators.layout().topology;
        let jobs: Vec<Job> = link_targets(&group, &active, topology)
            .into_iter()
            .map(|target| {
                Job::new(
                    JobPayload::CreateLink(LinkPayload {
                        from: LinkEndpoint::from_group(&group),
                        to: LinkEndpoint::from_group(target),
                    }),
                    now,
                )
            })
            .collect();
        if jobs.is_empty() {
            return Ok(0);
        }

        self.store.create_jobs(&jobs).await?;
        let pushed = enqueue_all(self.queue.as_ref(), &jobs).await;
        tracing::debug!(group_id = %group.id, ?topology, links = jobs.len(), pushed, "Queued tracks");
        Ok(jobs.len())
    }

    async fn after_failure(
        &self,
        job: &Job,
        error: &str,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, WorkerError> {
        let retry_count = job.retry_count + 1;
        if retry_count >= self.retry.max_attempts {
            self.store
                .fail_job(job.id, retry_count, error, self.clock.now())
                .await?;
            tracing::error!(
                job_id = %job.id,
                job_type = %job.job_type(),
                retry_count,
                error,
                "Job failed permanently"
            );
            return Ok(JobOutcome::Failed {
                job_id: job.id,
                retry_count,
            });
        }

        self.store.retry_job(job.id, retry_count, error).await?;
        let delay = self.retry.delay_for(retry_count);
        tracing::warn!(
            job_id = %job.id,
            retry_count,
            delay_ms = delay.as_millis() as u64,
            error,
            "Job failed, will retry"
        );

        match job.envelope() {
            Ok(envelope) => self.schedule_redelivery(envelope, delay, cancel.clone()),
            Err(e) => tracing::error!(
                job_id = %job.id,
                error = %e,
                "Cannot re-enqueue job, leaving it pending for reconciliation"
            ),
        }

        Ok(JobOutcome::Retrying {
            job_id: job.id,
            retry_count,
            delay,
        })
    }

    /// Push the envelope back after `delay`, unless shutdown comes first. The
    /// row is already Pending, so a skipped push is picked up at startup.
    fn schedule_redelivery(&self, envelope: JobEnvelope, delay: Duration, cancel: CancellationToken) {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(job_id = %envelope.job_id, "Shutdown before retry, leaving job pending");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = queue.push(&envelope).await {
                        tracing::error!(
                            job_id = %envelope.job_id,
                            error = %e,
                            "Failed to re-enqueue job for retry"
                        );
                    }
                }
            }
        });
    }
}
