//! Guildcraft Protocol - wire types shared with external collaborators
//!
//! - `events` - inbound chat-gateway events
//! - `requests` - REST request bodies
//! - `responses` - REST response bodies
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json, chrono, and thiserror
//! 2. **No business logic** - Pure data types and validation of required fields
//! 3. **No domain IDs** - raw integers and strings in DTOs

pub mod events;
pub mod requests;
pub mod responses;

pub use events::{parse_event, EventMeta, EventParseError, GatewayEvent, InboundEvent, Parsed};
pub use requests::{JobListQuery, SyncGroup, SyncMember, SyncRequest, TeleportQuery};
pub use responses::{
    EventAccepted, GroupResponse, JobResponse, MemberResponse, StatusResponse, SyncResponse,
    TeleportTarget,
};
