//! Event ingestion.
//!
//! Turns one gateway event into a store operation, then hands every job the
//! store created to the queue. The store commits entity and job rows
//! together; the queue push comes after the commit, and a push that fails
//! leaves the job Pending for startup reconciliation to pick up.

use std::sync::Arc;

use guildcraft_domain::Job;
use guildcraft_shared::{parse_event, InboundEvent, Parsed};

use crate::infrastructure::ports::{
    GroupUpsert, JobQueue, MemberUpdate, MemberUpsert, RepoError, WorldStore,
};
use crate::use_cases::jobs::enqueue_all;
use crate::use_cases::store_retry::with_constraint_retry;

/// What became of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// The store changed; `jobs_enqueued` jobs reached the queue.
    Processed { jobs_enqueued: usize },
    /// Valid, but nothing a building shows changed.
    Ignored,
    /// Duplicate delivery or unknown target; nothing to do.
    Noop,
    /// Malformed input, logged and discarded.
    Dropped(String),
}

impl Ingested {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ingested::Processed { .. } => "processed",
            Ingested::Ignored => "ignored",
            Ingested::Noop => "noop",
            Ingested::Dropped(_) => "dropped",
        }
    }

    pub fn jobs_enqueued(&self) -> usize {
        match self {
            Ingested::Processed { jobs_enqueued } => *jobs_enqueued,
            _ => 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Store rejected the event: {0}")]
    Store(#[from] RepoError),
}

/// Consumes gateway events.
pub struct EventConsumer {
    store: Arc<dyn WorldStore>,
    queue: Arc<dyn JobQueue>,
}

impl EventConsumer {
    pub fn new(store: Arc<dyn WorldStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Parse and handle raw gateway JSON. Malformed input is never an error.
    pub async fn handle_raw(&self, json: &str) -> Result<Ingested, IngestError> {
        match parse_event(json) {
            Ok(Parsed::Event(meta, event)) => {
                tracing::debug!(
                    guild_id = %meta.guild_id,
                    event_type = event.kind(),
                    timestamp = %meta.timestamp,
                    "Gateway event received"
                );
                self.handle(event).await
            }
            Ok(Parsed::Ignored(meta)) => {
                tracing::debug!(guild_id = %meta.guild_id, "Update touched no structural field");
                Ok(Ingested::Ignored)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed gateway event");
                Ok(Ingested::Dropped(e.to_string()))
            }
        }
    }

    pub async fn handle(&self, event: InboundEvent) -> Result<Ingested, IngestError> {
        let kind = event.kind();
        let (changed, jobs) = match event {
            InboundEvent::GroupCreated {
                group_id,
                name,
                position,
            } => {
                let upsert = GroupUpsert {
                    external_id: group_id,
                    name,
                    position,
                };
                let outcome =
                    with_constraint_retry(kind, || self.store.upsert_group(upsert.clone())).await?;
                (outcome.created || outcome.updated, outcome.jobs)
            }
            InboundEvent::GroupDeleted { group_id } => {
                match self.store.archive_group(&group_id).await? {
                    Some(archived) => (archived.newly_archived, archived.jobs),
                    None => {
                        tracing::debug!(group_id = %group_id, "Delete for unknown group");
                        (false, Vec::new())
                    }
                }
            }
            InboundEvent::MemberCreated {
                member_id,
                group_id,
                name,
                topic,
                position,
            } => {
                let upsert = MemberUpsert {
                    external_id: member_id,
                    group_external_id: group_id,
                    name,
                    topic,
                    position,
                };
                let outcome =
                    with_constraint_retry(kind, || self.store.upsert_member(upsert.clone()))
                        .await?;
                (outcome.created || outcome.updated, outcome.jobs)
            }
            InboundEvent::MemberDeleted { member_id } => {
                match self.store.archive_member(&member_id).await? {
                    Some(archived) => (archived.newly_archived, archived.jobs),
                    None => {
                        tracing::debug!(member_id = %member_id, "Delete for unknown member");
                        (false, Vec::new())
                    }
                }
            }
            InboundEvent::MemberUpdated {
                member_id,
                group_id,
                name,
                topic,
                position,
            } => {
                let update = MemberUpdate {
                    external_id: member_id.clone(),
                    name: name.clone(),
                    topic: topic.clone(),
                    position,
                };
                match self.store.update_member(update).await? {
                    Some(updated) => (updated.changed, updated.jobs),
                    // The create was lost or is still in flight.
                    None => match group_id {
                        Some(group_id) => {
                            tracing::info!(
                                member_id = %member_id,
                                group_id = %group_id,
                                "Update for unknown member, creating it"
                            );
                            let upsert = MemberUpsert {
                                name: name.unwrap_or_else(|| format!("member-{member_id}")),
                                external_id: member_id,
                                group_external_id: group_id,
                                topic: topic.filter(|t| !t.is_empty()),
                                position: position.unwrap_or_default(),
                            };
                            let outcome = with_constraint_retry(kind, || {
                                self.store.upsert_member(upsert.clone())
                            })
                            .await?;
                            (outcome.created || outcome.updated, outcome.jobs)
                        }
                        None => {
                            tracing::debug!(
                                member_id = %member_id,
                                "Update for unknown member without a parent, ignoring"
                            );
                            (false, Vec::new())
                        }
                    },
                }
            }
        };

        if !changed && jobs.is_empty() {
            return Ok(Ingested::Noop);
        }
        let jobs_enqueued = self.enqueue(&jobs).await;
        tracing::info!(event_type = kind, jobs = jobs.len(), jobs_enqueued, "Event processed");
        Ok(Ingested::Processed { jobs_enqueued })
    }

    async fn enqueue(&self, jobs: &[Job]) -> usize {
        enqueue_all(self.queue.as_ref(), jobs).await
    }
}
