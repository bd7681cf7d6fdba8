//! Bulk hierarchical sync.
//!
//! The bot posts its whole category/channel tree; every node goes through the
//! same upsert path a single gateway event would, so a sync after a missed
//! event converges on the same world.

use std::sync::Arc;

use guildcraft_shared::{SyncRequest, SyncResponse};

use crate::infrastructure::ports::{GroupUpsert, JobQueue, MemberUpsert, RepoError, WorldStore};
use crate::use_cases::jobs::enqueue_all;
use crate::use_cases::store_retry::with_constraint_retry;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Sync rejected: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] RepoError),
}

pub struct SyncUseCase {
    store: Arc<dyn WorldStore>,
    queue: Arc<dyn JobQueue>,
}

impl SyncUseCase {
    pub fn new(store: Arc<dyn WorldStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Upsert every group, then every member, enqueueing each batch of jobs
    /// as soon as its transaction commits. Groups go first so villages are
    /// queued ahead of their buildings.
    pub async fn execute(&self, request: SyncRequest) -> Result<SyncResponse, SyncError> {
        validate(&request)?;
        let mut response = SyncResponse::default();

        for group in &request.groups {
            let upsert = GroupUpsert {
                external_id: group.external_id.clone(),
                name: group.name.clone(),
                position: group.position,
            };
            let outcome =
                with_constraint_retry("sync_group", || self.store.upsert_group(upsert.clone()))
                    .await?;
            response.groups += 1;
            tally(&mut response, outcome.created, outcome.updated);
            response.jobs_enqueued += enqueue_all(self.queue.as_ref(), &outcome.jobs).await as u32;
        }

        for group in &request.groups {
            for member in &group.members {
                let upsert = MemberUpsert {
                    external_id: member.external_id.clone(),
                    group_external_id: group.external_id.clone(),
                    name: member.name.clone(),
                    topic: member.topic.clone(),
                    position: member.position,
                };
                let outcome = with_constraint_retry("sync_member", || {
                    self.store.upsert_member(upsert.clone())
                })
                .await?;
                response.members += 1;
                tally(&mut response, outcome.created, outcome.updated);
                response.jobs_enqueued +=
                    enqueue_all(self.queue.as_ref(), &outcome.jobs).await as u32;
            }
        }

        tracing::info!(
            groups = response.groups,
            members = response.members,
            created = response.created_records,
            updated = response.updated_records,
            jobs = response.jobs_enqueued,
            "Sync applied"
        );
        Ok(response)
    }
}

fn tally(response: &mut SyncResponse, created: bool, updated: bool) {
    if created {
        response.created_records += 1;
    } else if updated {
        response.updated_records += 1;
    }
}

/// Reject the whole tree up front rather than applying half of it.
fn validate(request: &SyncRequest) -> Result<(), SyncError> {
    for group in &request.groups {
        if group.external_id.trim().is_empty() {
            return Err(SyncError::Invalid("group without externalId".into()));
        }
        if let Some(member) = group.members.iter().find(|m| m.external_id.trim().is_empty()) {
            return Err(SyncError::Invalid(format!(
                "member '{}' in group {} has no externalId",
                member.name, group.external_id
            )));
        }
    }
    Ok(())
}
