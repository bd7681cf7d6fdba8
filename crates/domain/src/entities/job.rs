//! Job entity - a durable unit of construction work
//!
//! # Status machine
//!
//! ```text
//! Pending -> InProgress -> Completed
//!              |  ^     -> Failed      (retries exhausted)
//!              v  |
//!             Pending                   (retry, or crash recovery)
//! ```
//!
//! `Completed` and `Failed` are terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{JobEnvelope, JobPayload};
use crate::{DomainError, JobId};

/// Error messages are cut to this many characters before they are stored.
pub const MAX_ERROR_LEN: usize = 500;

/// The fixed set of job kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    CreateGroup,
    CreateMember,
    UpdateMember,
    CreateLink,
    ArchiveMember,
    ArchiveGroup,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::CreateGroup => "CreateGroup",
            JobType::CreateMember => "CreateMember",
            JobType::UpdateMember => "UpdateMember",
            JobType::CreateLink => "CreateLink",
            JobType::ArchiveMember => "ArchiveMember",
            JobType::ArchiveGroup => "ArchiveGroup",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CreateGroup" => Ok(JobType::CreateGroup),
            "CreateMember" => Ok(JobType::CreateMember),
            "UpdateMember" => Ok(JobType::UpdateMember),
            "CreateLink" => Ok(JobType::CreateLink),
            "ArchiveMember" => Ok(JobType::ArchiveMember),
            "ArchiveGroup" => Ok(JobType::ArchiveGroup),
            other => Err(DomainError::parse(format!("Unknown job type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the status machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Completed)
                | (JobStatus::InProgress, JobStatus::Pending)
                | (JobStatus::InProgress, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::parse(format!("Unknown job status: {other}"))),
        }
    }
}

/// A durable job row.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(payload: JobPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            payload,
            status: JobStatus::Pending,
            error_message: None,
            retry_count: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    /// Queue envelope for this job.
    pub fn envelope(&self) -> Result<JobEnvelope, DomainError> {
        Ok(JobEnvelope {
            job_type: self.job_type(),
            job_id: self.id,
            payload: self.payload.to_json()?,
            created_at: self.created_at,
        })
    }
}

/// Cut an error message to [`MAX_ERROR_LEN`] characters.
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::GroupPayload;
    use crate::GroupId;

    fn payload() -> JobPayload {
        JobPayload::CreateGroup(GroupPayload {
            group_id: GroupId::from_raw(1),
            external_id: "cat-1".into(),
            name: "General".into(),
            ordinal_index: 1,
            center_x: 240,
            center_z: 0,
        })
    }

    #[test]
    fn new_jobs_start_pending() {
        let job = Job::new(payload(), Utc::now());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.job_type(), JobType::CreateGroup);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn status_machine_only_moves_forward_except_retry() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Pending));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Failed.can_transition_to(Pending));
        assert!(Completed.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn job_type_and_status_round_trip_through_strings() {
        for ty in [
            JobType::CreateGroup,
            JobType::CreateMember,
            JobType::UpdateMember,
            JobType::CreateLink,
            JobType::ArchiveMember,
            JobType::ArchiveGroup,
        ] {
            assert_eq!(ty.as_str().parse::<JobType>(), Ok(ty));
        }
        assert!("Demolish".parse::<JobType>().is_err());
        assert_eq!("in_progress".parse::<JobStatus>(), Ok(JobStatus::InProgress));
    }

    #[test]
    fn error_messages_are_truncated_on_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_LEN + 20);
        let cut = truncate_error(&long);
        assert_eq!(cut.chars().count(), MAX_ERROR_LEN);
        assert_eq!(truncate_error("short"), "short");
    }

    #[test]
    fn envelope_carries_serialized_payload() {
        let job = Job::new(payload(), Utc::now());
        let envelope = job.envelope().expect("envelope");
        assert_eq!(envelope.job_id, job.id);
        assert_eq!(envelope.job_type, JobType::CreateGroup);
        let decoded =
            JobPayload::from_json(envelope.job_type, &envelope.payload).expect("decode");
        assert_eq!(decoded, job.payload);
    }
}
