//! Group entity - a channel category, built as a village

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::GroundPos;
use crate::GroupId;

/// A village. Created on the first event that references it, archived
/// (never deleted) when the category goes away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    /// Stable key from the chat platform.
    pub external_id: String,
    pub name: String,
    /// Sort position on the chat platform.
    pub position: i64,
    /// Assignment order. Never reused, 0 is the hub.
    pub ordinal_index: u32,
    pub center_x: i32,
    pub center_z: i32,
    pub is_archived: bool,
    /// Auto-created for a child that arrived before its parent.
    pub is_placeholder: bool,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn center(&self) -> GroundPos {
        GroundPos::new(self.center_x, self.center_z)
    }

    /// Name given to a group that was created on behalf of an early child.
    pub fn placeholder_name(external_id: &str) -> String {
        format!("group-{external_id}")
    }
}

/// A group plus its active member count, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub group: Group,
    pub member_count: u32,
}
