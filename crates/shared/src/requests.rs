//! REST request bodies and query strings.

use serde::{Deserialize, Serialize};

/// Full hierarchical snapshot of the community, posted by the bot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub groups: Vec<SyncGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncGroup {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub members: Vec<SyncMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMember {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub position: i64,
}

/// `?name=` for the teleport lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeleportQuery {
    pub name: String,
}

/// `?status=` filter for the job listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}
