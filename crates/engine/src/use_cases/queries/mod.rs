//! Read side of the REST surface: villages, buildings, teleport lookup,
//! status counts and job inspection.

use std::sync::Arc;

use guildcraft_domain::{GroupId, GroupSummary, Job, JobStatus, LayoutConfig, Member};
use guildcraft_shared::{
    GroupResponse, JobListQuery, JobResponse, MemberResponse, StatusResponse, TeleportTarget,
};

use crate::infrastructure::ports::{RepoError, WorldStore};

const DEFAULT_JOB_LIMIT: u32 = 50;
const MAX_JOB_LIMIT: u32 = 500;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid query: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] RepoError),
}

pub struct WorldQueries {
    store: Arc<dyn WorldStore>,
    layout: LayoutConfig,
}

impl WorldQueries {
    pub fn new(store: Arc<dyn WorldStore>, layout: LayoutConfig) -> Self {
        Self { store, layout }
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupResponse>, QueryError> {
        let groups = self.store.list_active_groups().await?;
        Ok(groups.into_iter().map(group_response).collect())
    }

    /// Every building of a village, archived ones included.
    pub async fn group_members(&self, id: i64) -> Result<Vec<MemberResponse>, QueryError> {
        let found = self
            .store
            .get_group_with_members(GroupId::from_raw(id))
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("Group {id}")))?;
        Ok(found.members.iter().map(member_response).collect())
    }

    /// Best name match among active buildings. Prefers the built location and
    /// falls back to the planned one.
    pub async fn teleport(&self, name: &str) -> Result<TeleportTarget, QueryError> {
        let needle = name.trim();
        if needle.is_empty() {
            return Err(QueryError::Invalid("name must not be empty".into()));
        }
        let found = self
            .store
            .search_members(needle, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::NotFound(format!("Member matching '{needle}'")))?;

        let location = found
            .member
            .location()
            .ok_or_else(|| QueryError::NotFound(format!("Location of {}", found.member.name)))?;
        Ok(TeleportTarget {
            member_id: found.member.id.as_i64(),
            member_name: found.member.name.clone(),
            group_name: found.group.name,
            x: location.x,
            y: self.layout.base_y,
            z: location.z,
            built: found.member.is_built(),
        })
    }

    pub async fn status(&self) -> Result<StatusResponse, QueryError> {
        let counts = self.store.status_counts().await?;
        Ok(StatusResponse {
            active_groups: counts.active_groups,
            active_members: counts.active_members,
            pending_jobs: counts.pending_jobs,
            failed_jobs: counts.failed_jobs,
        })
    }

    /// Newest first, optionally filtered by status.
    pub async fn list_jobs(&self, query: JobListQuery) -> Result<Vec<JobResponse>, QueryError> {
        let status = query
            .status
            .as_deref()
            .map(|s| s.parse::<JobStatus>())
            .transpose()
            .map_err(|e| QueryError::Invalid(e.to_string()))?;
        let limit = query.limit.unwrap_or(DEFAULT_JOB_LIMIT).clamp(1, MAX_JOB_LIMIT);
        let jobs = self.store.list_jobs(status, limit).await?;
        Ok(jobs.iter().map(job_response).collect())
    }
}

fn group_response(summary: GroupSummary) -> GroupResponse {
    let GroupSummary {
        group,
        member_count,
    } = summary;
    GroupResponse {
        id: group.id.as_i64(),
        external_id: group.external_id,
        name: group.name,
        ordinal_index: group.ordinal_index,
        center_x: group.center_x,
        center_z: group.center_z,
        is_placeholder: group.is_placeholder,
        member_count,
    }
}

fn member_response(member: &Member) -> MemberResponse {
    MemberResponse {
        id: member.id.as_i64(),
        external_id: member.external_id.clone(),
        name: member.name.clone(),
        topic: member.topic.clone(),
        member_index: member.member_index,
        planned_x: member.planned_x,
        planned_z: member.planned_z,
        built_x: member.built_x,
        built_z: member.built_z,
        is_archived: member.is_archived,
    }
}

fn job_response(job: &Job) -> JobResponse {
    JobResponse {
        id: job.id.to_string(),
        job_type: job.job_type().to_string(),
        status: job.status.to_string(),
        error_message: job.error_message.clone(),
        retry_count: job.retry_count,
        created_at: job.created_at,
        started_at: job.started_at,
        completed_at: job.completed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{group_upsert, member_upsert, temp_store, TempStore};

    async fn seeded() -> (TempStore, WorldQueries) {
        let t = temp_store(LayoutConfig::default()).await;
        t.store.upsert_group(group_upsert("g1", "Lobby")).await.expect("g1");
        for (ext, name) in [("m1", "general"), ("m2", "general-chat"), ("m3", "dev-general")] {
            t.store
                .upsert_member(member_upsert(ext, "g1", name))
                .await
                .expect("member");
        }
        let queries = WorldQueries::new(t.store.clone(), LayoutConfig::default());
        (t, queries)
    }

    #[tokio::test]
    async fn groups_report_member_counts() {
        let (_t, queries) = seeded().await;
        let groups = queries.list_groups().await.expect("groups");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Lobby");
        assert_eq!(groups[0].member_count, 3);
    }

    #[tokio::test]
    async fn members_include_archived_ones() {
        let (t, queries) = seeded().await;
        t.store.archive_member("m2").await.expect("archive");
        let id = queries.list_groups().await.expect("groups")[0].id;

        let members = queries.group_members(id).await.expect("members");

        assert_eq!(members.len(), 3);
        assert!(members.iter().any(|m| m.external_id == "m2" && m.is_archived));
        assert!(members.iter().all(|m| m.planned_x.is_some() && m.built_x.is_none()));
    }

    #[tokio::test]
    async fn unknown_group_is_not_found() {
        let (_t, queries) = seeded().await;
        let err = queries.group_members(999).await.expect_err("missing");
        assert!(matches!(err, QueryError::NotFound(_)));
    }

    #[tokio::test]
    async fn teleport_prefers_the_exact_name() {
        let (t, queries) = seeded().await;
        let target = queries.teleport("GENERAL").await.expect("target");

        assert_eq!(target.member_name, "general");
        assert_eq!(target.group_name, "Lobby");
        assert_eq!(target.y, LayoutConfig::default().base_y);
        assert!(!target.built);

        let member = t
            .store
            .get_member_by_external_id("m1")
            .await
            .expect("query")
            .expect("member");
        assert_eq!(Some((target.x, target.z)), member.planned().map(|p| (p.x, p.z)));
    }

    #[tokio::test]
    async fn teleport_uses_the_built_location_once_known() {
        let (t, queries) = seeded().await;
        let member = t
            .store
            .get_member_by_external_id("m1")
            .await
            .expect("query")
            .expect("member");
        t.store
            .mark_member_built(member.id, 1000, -1000)
            .await
            .expect("built");

        let target = queries.teleport("general").await.expect("target");
        assert!(target.built);
        assert_eq!((target.x, target.z), (1000, -1000));
    }

    #[tokio::test]
    async fn teleport_misses_are_not_found() {
        let (_t, queries) = seeded().await;
        assert!(matches!(
            queries.teleport("random").await,
            Err(QueryError::NotFound(_))
        ));
        assert!(matches!(queries.teleport("  ").await, Err(QueryError::Invalid(_))));
    }

    #[tokio::test]
    async fn status_counts_pending_work() {
        let (_t, queries) = seeded().await;
        let status = queries.status().await.expect("status");
        assert_eq!(
            status,
            StatusResponse {
                active_groups: 1,
                active_members: 3,
                pending_jobs: 4,
                failed_jobs: 0,
            }
        );
    }

    #[tokio::test]
    async fn jobs_filter_by_status() {
        let (_t, queries) = seeded().await;
        let pending = queries
            .list_jobs(JobListQuery {
                status: Some("pending".into()),
                limit: Some(2),
            })
            .await
            .expect("jobs");
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|j| j.status == "pending"));

        let failed = queries
            .list_jobs(JobListQuery {
                status: Some("failed".into()),
                limit: None,
            })
            .await
            .expect("jobs");
        assert!(failed.is_empty());

        let err = queries
            .list_jobs(JobListQuery {
                status: Some("exploded".into()),
                limit: None,
            })
            .await
            .expect_err("bad status");
        assert!(matches!(err, QueryError::Invalid(_)));
    }
}
