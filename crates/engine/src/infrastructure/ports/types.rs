//! Inputs and outcomes of the store's ingest operations.

use guildcraft_domain::{Group, Job, Member};

/// A category as the chat platform describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupUpsert {
    pub external_id: String,
    pub name: String,
    pub position: i64,
}

/// A channel as the chat platform describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberUpsert {
    pub external_id: String,
    pub group_external_id: String,
    pub name: String,
    pub topic: Option<String>,
    pub position: i64,
}

/// Changes to an existing channel. `None` keeps the stored value; an empty
/// `topic` clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberUpdate {
    pub external_id: String,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub position: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct GroupUpserted {
    pub group: Group,
    pub created: bool,
    /// A placeholder got its real name, or name/position changed.
    pub updated: bool,
    /// Jobs persisted in the same transaction, all Pending.
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone)]
pub struct MemberUpserted {
    pub member: Member,
    pub group: Group,
    pub created: bool,
    /// The parent did not exist and was auto-created.
    pub group_created: bool,
    pub updated: bool,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone)]
pub struct MemberUpdated {
    pub member: Member,
    pub changed: bool,
    pub jobs: Vec<Job>,
}

/// Result of an idempotent archive.
#[derive(Debug, Clone)]
pub struct Archived<T> {
    pub entity: T,
    /// False when the entity was already archived.
    pub newly_archived: bool,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone)]
pub struct GroupWithMembers {
    pub group: Group,
    /// Every member, archived ones included, by member index.
    pub members: Vec<Member>,
}

/// A member found by name, with the village it belongs to.
#[derive(Debug, Clone)]
pub struct MemberMatch {
    pub member: Member,
    pub group: Group,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub active_groups: u32,
    pub active_members: u32,
    pub pending_jobs: u32,
    pub in_progress_jobs: u32,
    pub failed_jobs: u32,
}
