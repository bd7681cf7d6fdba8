//! Guildcraft domain.
//!
//! Villages ([`Group`]), buildings ([`Member`]) and construction [`Job`]s, plus
//! the spatial planner that places them. No I/O lives here.

pub mod entities;
pub mod error;
pub mod ids;
pub mod value_objects;

pub use entities::{
    truncate_error, Group, GroupSummary, Job, JobStatus, JobType, Member, MAX_ERROR_LEN,
};

pub use error::DomainError;

// Re-export ID types
pub use ids::{GroupId, JobId, MemberId};

pub use value_objects::{
    layout, ArchiveGroupPayload, BlockPos, GroundPos, GroupPayload, JobEnvelope, JobPayload,
    LayoutConfig, LinkEndpoint, LinkPayload, LinkTopology, MemberLayout, MemberPayload,
};
