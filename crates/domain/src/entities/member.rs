//! Member entity - a channel, built as a single building

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::GroundPos;
use crate::{GroupId, MemberId};

/// A building inside a village.
///
/// `planned_*` is written when the member is created; `built_*` only after the
/// construction job succeeded. Archival never clears either pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: MemberId,
    pub external_id: String,
    pub group_id: GroupId,
    pub name: String,
    pub topic: Option<String>,
    pub position: i64,
    /// Slot within the group. Monotonic, archived slots are never reused.
    pub member_index: u32,
    pub planned_x: Option<i32>,
    pub planned_z: Option<i32>,
    pub built_x: Option<i32>,
    pub built_z: Option<i32>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn planned(&self) -> Option<GroundPos> {
        Some(GroundPos::new(self.planned_x?, self.planned_z?))
    }

    pub fn built(&self) -> Option<GroundPos> {
        Some(GroundPos::new(self.built_x?, self.built_z?))
    }

    pub fn is_built(&self) -> bool {
        self.built().is_some()
    }

    /// Where the building stands, or will stand.
    pub fn location(&self) -> Option<GroundPos> {
        self.built().or_else(|| self.planned())
    }
}
