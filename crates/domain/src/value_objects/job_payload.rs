//! Job payloads and the queue envelope.
//!
//! Payloads carry every coordinate a generator needs, computed once by the
//! store when the job was created. A re-delivered job therefore rebuilds
//! exactly what the first delivery would have built.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::entities::{Group, JobType, Member};
use crate::value_objects::GroundPos;
use crate::{DomainError, GroupId, JobId, MemberId};

/// A village to build or archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPayload {
    pub group_id: GroupId,
    pub external_id: String,
    pub name: String,
    pub ordinal_index: u32,
    pub center_x: i32,
    pub center_z: i32,
}

impl GroupPayload {
    pub fn from_group(group: &Group) -> Self {
        Self {
            group_id: group.id,
            external_id: group.external_id.clone(),
            name: group.name.clone(),
            ordinal_index: group.ordinal_index,
            center_x: group.center_x,
            center_z: group.center_z,
        }
    }

    pub fn center(&self) -> GroundPos {
        GroundPos::new(self.center_x, self.center_z)
    }
}

/// A building to build, re-sign, or archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPayload {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub external_id: String,
    pub group_name: String,
    pub name: String,
    pub topic: Option<String>,
    pub member_index: u32,
    pub x: i32,
    pub z: i32,
}

impl MemberPayload {
    /// Uses the built position when there is one, else the planned one.
    pub fn from_member(member: &Member, group: &Group) -> Self {
        let at = member.location().unwrap_or_else(|| group.center());
        Self {
            group_id: group.id,
            member_id: member.id,
            external_id: member.external_id.clone(),
            group_name: group.name.clone(),
            name: member.name.clone(),
            topic: member.topic.clone(),
            member_index: member.member_index,
            x: at.x,
            z: at.z,
        }
    }

    pub fn position(&self) -> GroundPos {
        GroundPos::new(self.x, self.z)
    }
}

/// One end of a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkEndpoint {
    pub group_id: GroupId,
    pub name: String,
    pub center_x: i32,
    pub center_z: i32,
}

impl LinkEndpoint {
    pub fn from_group(group: &Group) -> Self {
        Self {
            group_id: group.id,
            name: group.name.clone(),
            center_x: group.center_x,
            center_z: group.center_z,
        }
    }

    pub fn center(&self) -> GroundPos {
        GroundPos::new(self.center_x, self.center_z)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPayload {
    pub from: LinkEndpoint,
    pub to: LinkEndpoint,
}

/// A village archive, cascading to every building it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveGroupPayload {
    pub group: GroupPayload,
    pub members: Vec<MemberPayload>,
}

/// Typed payload, one variant per [`JobType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPayload {
    CreateGroup(GroupPayload),
    CreateMember(MemberPayload),
    UpdateMember(MemberPayload),
    CreateLink(LinkPayload),
    ArchiveMember(MemberPayload),
    ArchiveGroup(ArchiveGroupPayload),
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::CreateGroup(_) => JobType::CreateGroup,
            JobPayload::CreateMember(_) => JobType::CreateMember,
            JobPayload::UpdateMember(_) => JobType::UpdateMember,
            JobPayload::CreateLink(_) => JobType::CreateLink,
            JobPayload::ArchiveMember(_) => JobType::ArchiveMember,
            JobPayload::ArchiveGroup(_) => JobType::ArchiveGroup,
        }
    }

    /// Serialize the variant body; the type travels separately.
    pub fn to_json(&self) -> Result<String, DomainError> {
        let json = match self {
            JobPayload::CreateGroup(p) => serde_json::to_string(p),
            JobPayload::CreateMember(p)
            | JobPayload::UpdateMember(p)
            | JobPayload::ArchiveMember(p) => serde_json::to_string(p),
            JobPayload::CreateLink(p) => serde_json::to_string(p),
            JobPayload::ArchiveGroup(p) => serde_json::to_string(p),
        };
        json.map_err(|e| DomainError::parse(format!("job payload: {e}")))
    }

    pub fn from_json(job_type: JobType, json: &str) -> Result<Self, DomainError> {
        Ok(match job_type {
            JobType::CreateGroup => JobPayload::CreateGroup(decode(json)?),
            JobType::CreateMember => JobPayload::CreateMember(decode(json)?),
            JobType::UpdateMember => JobPayload::UpdateMember(decode(json)?),
            JobType::CreateLink => JobPayload::CreateLink(decode(json)?),
            JobType::ArchiveMember => JobPayload::ArchiveMember(decode(json)?),
            JobType::ArchiveGroup => JobPayload::ArchiveGroup(decode(json)?),
        })
    }
}

fn decode<T: DeserializeOwned>(json: &str) -> Result<T, DomainError> {
    serde_json::from_str(json).map_err(|e| DomainError::parse(format!("job payload: {e}")))
}

/// What actually sits on the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub job_type: JobType,
    pub job_id: JobId,
    /// Serialized payload JSON for `job_type`.
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl JobEnvelope {
    pub fn to_json(&self) -> Result<String, DomainError> {
        serde_json::to_string(self).map_err(|e| DomainError::parse(format!("job envelope: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        serde_json::from_str(json).map_err(|e| DomainError::parse(format!("job envelope: {e}")))
    }
}
