//! REST response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An active village with its active building count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub ordinal_index: u32,
    pub center_x: i32,
    pub center_z: i32,
    pub is_placeholder: bool,
    pub member_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub topic: Option<String>,
    pub member_index: u32,
    pub planned_x: Option<i32>,
    pub planned_z: Option<i32>,
    pub built_x: Option<i32>,
    pub built_z: Option<i32>,
    pub is_archived: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Groups and members that did not exist before.
    pub created_records: u32,
    /// Existing records whose fields changed.
    pub updated_records: u32,
    pub jobs_enqueued: u32,
    pub groups: u32,
    pub members: u32,
}

/// Where to send a player who asked for a channel by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeleportTarget {
    pub member_id: i64,
    pub member_name: String,
    pub group_name: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// False while the building is only planned.
    pub built: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub active_groups: u32,
    pub active_members: u32,
    pub pending_jobs: u32,
    pub failed_jobs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: String,
    pub job_type: String,
    pub status: String,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Reply to a posted gateway event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccepted {
    /// `processed`, `ignored` or `noop`.
    pub outcome: String,
    pub jobs_enqueued: u32,
}
