//! Value objects: placement math and job payloads.

mod job_payload;
pub mod layout;

pub use job_payload::{
    ArchiveGroupPayload, GroupPayload, JobEnvelope, JobPayload, LinkEndpoint, LinkPayload,
    MemberPayload,
};
pub use layout::{BlockPos, GroundPos, LayoutConfig, LinkTopology, MemberLayout};
