//! Repository port for the world store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guildcraft_domain::*;

use super::error::RepoError;
use super::types::{
    Archived, GroupUpsert, GroupUpserted, GroupWithMembers, MemberMatch, MemberUpdate,
    MemberUpdated, MemberUpsert, MemberUpserted, StatusCounts,
};

/// System of record for villages, buildings and jobs.
///
/// Every ingest method is one transaction: the entity mutation and the Job
/// rows it implies are committed together, so a crash never leaves an
/// entity without its construction job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorldStore: Send + Sync {
    // Ingest
    async fn upsert_group(&self, upsert: GroupUpsert) -> Result<GroupUpserted, RepoError>;
    async fn upsert_member(&self, upsert: MemberUpsert) -> Result<MemberUpserted, RepoError>;
    /// `None` when the member is unknown.
    async fn update_member(&self, update: MemberUpdate)
        -> Result<Option<MemberUpdated>, RepoError>;
    async fn archive_member(&self, external_id: &str)
        -> Result<Option<Archived<Member>>, RepoError>;
    async fn archive_group(&self, external_id: &str) -> Result<Option<Archived<Group>>, RepoError>;

    // Queries
    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, RepoError>;
    async fn get_group_by_external_id(&self, external_id: &str)
        -> Result<Option<Group>, RepoError>;
    async fn get_member_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Member>, RepoError>;
    /// Active groups by ordinal, each with its active member count.
    async fn list_active_groups(&self) -> Result<Vec<GroupSummary>, RepoError>;
    async fn get_group_with_members(&self, id: GroupId)
        -> Result<Option<GroupWithMembers>, RepoError>;
    /// Active members of one group, by member index.
    async fn list_members(&self, group_id: GroupId) -> Result<Vec<Member>, RepoError>;
    /// Active members whose name contains `needle`, case-insensitively.
    async fn search_members(&self, needle: &str, limit: u32) -> Result<Vec<MemberMatch>, RepoError>;
    async fn status_counts(&self) -> Result<StatusCounts, RepoError>;
    /// Record where a building was actually constructed.
    async fn mark_member_built(&self, id: MemberId, x: i32, z: i32) -> Result<(), RepoError>;

    // Jobs
    async fn get_job(&self, id: JobId) -> Result<Option<Job>, RepoError>;
    async fn create_jobs(&self, jobs: &[Job]) -> Result<(), RepoError>;
    /// Pending -> InProgress. `false` when the job was not Pending.
    async fn claim_job(&self, id: JobId, now: DateTime<Utc>) -> Result<bool, RepoError>;
    /// InProgress -> Completed.
    async fn complete_job(&self, id: JobId, now: DateTime<Utc>) -> Result<(), RepoError>;
    /// InProgress -> Pending with a new retry count and the failure text.
    async fn retry_job(&self, id: JobId, retry_count: u32, error: &str) -> Result<(), RepoError>;
    /// InProgress -> Failed.
    async fn fail_job(
        &self,
        id: JobId,
        retry_count: u32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepoError>;
    /// Newest first.
    async fn list_jobs(&self, status: Option<JobStatus>, limit: u32)
        -> Result<Vec<Job>, RepoError>;
    /// Oldest first.
    async fn list_pending_jobs(&self) -> Result<Vec<Job>, RepoError>;
    /// InProgress jobs started before `started_before` go back to Pending.
    async fn reset_stale_jobs(&self, started_before: DateTime<Utc>) -> Result<u64, RepoError>;
}
