//! Inbound chat-gateway events.
//!
//! The gateway posts one JSON object per event. `eventType`, `timestamp` and
//! `guildId` are required on every event; the rest depends on the type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fields whose change alters a building on screen.
pub const STRUCTURAL_FIELDS: [&str; 3] = ["name", "topic", "position"];

/// Raw event as posted by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEvent {
    pub event_type: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub guild_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub member_name: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    /// Names of the fields an update touched, when the gateway knows them.
    #[serde(default)]
    pub changed_fields: Option<Vec<String>>,
}

/// Envelope fields common to every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub guild_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A validated event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    GroupCreated {
        group_id: String,
        name: String,
        position: i64,
    },
    GroupDeleted {
        group_id: String,
    },
    MemberCreated {
        member_id: String,
        group_id: String,
        name: String,
        topic: Option<String>,
        position: i64,
    },
    MemberDeleted {
        member_id: String,
    },
    /// Carries the member's current state; the store diffs it.
    MemberUpdated {
        member_id: String,
        group_id: Option<String>,
        name: Option<String>,
        topic: Option<String>,
        position: Option<i64>,
    },
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::GroupCreated { .. } => "GroupCreated",
            InboundEvent::GroupDeleted { .. } => "GroupDeleted",
            InboundEvent::MemberCreated { .. } => "MemberCreated",
            InboundEvent::MemberDeleted { .. } => "MemberDeleted",
            InboundEvent::MemberUpdated { .. } => "MemberUpdated",
        }
    }
}

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("Malformed event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("Event {event_type} is missing `{field}`")]
    MissingEventField {
        event_type: &'static str,
        field: &'static str,
    },

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// Outcome of parsing an update that touched no structural field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Event(EventMeta, InboundEvent),
    /// Valid, but nothing a building shows changed.
    Ignored(EventMeta),
}

/// Parse and validate one gateway event.
pub fn parse_event(json: &str) -> Result<Parsed, EventParseError> {
    let raw: GatewayEvent = serde_json::from_str(json)?;
    raw.validate()
}

impl GatewayEvent {
    pub fn validate(self) -> Result<Parsed, EventParseError> {
        let event_type = non_empty(self.event_type)
            .ok_or(EventParseError::MissingField { field: "eventType" })?;
        let timestamp = self
            .timestamp
            .ok_or(EventParseError::MissingField { field: "timestamp" })?;
        let guild_id =
            non_empty(self.guild_id).ok_or(EventParseError::MissingField { field: "guildId" })?;
        let meta = EventMeta {
            guild_id,
            timestamp,
        };

        let event = match event_type.as_str() {
            "GroupCreated" => {
                let group_id = require("GroupCreated", "groupId", self.group_id)?;
                InboundEvent::GroupCreated {
                    name: non_empty(self.group_name)
                        .unwrap_or_else(|| format!("group-{group_id}")),
                    group_id,
                    position: self.position.unwrap_or_default(),
                }
            }
            "GroupDeleted" => InboundEvent::GroupDeleted {
                group_id: require("GroupDeleted", "groupId", self.group_id)?,
            },
            "MemberCreated" => {
                let member_id = require("MemberCreated", "memberId", self.member_id)?;
                InboundEvent::MemberCreated {
                    group_id: require("MemberCreated", "groupId", self.group_id)?,
                    name: non_empty(self.member_name)
                        .unwrap_or_else(|| format!("member-{member_id}")),
                    member_id,
                    topic: non_empty(self.topic),
                    position: self.position.unwrap_or_default(),
                }
            }
            "MemberDeleted" => InboundEvent::MemberDeleted {
                member_id: require("MemberDeleted", "memberId", self.member_id)?,
            },
            "MemberUpdated" => {
                let member_id = require("MemberUpdated", "memberId", self.member_id)?;
                let mut topic_changed = false;
                if let Some(changed) = &self.changed_fields {
                    let structural = changed
                        .iter()
                        .any(|f| STRUCTURAL_FIELDS.contains(&f.as_str()));
                    if !structural {
                        return Ok(Parsed::Ignored(meta));
                    }
                    topic_changed = changed.iter().any(|f| f == "topic");
                }
                let topic = match self.topic {
                    Some(topic) => Some(topic.trim().to_string()),
                    // Reported as changed but absent: the topic was removed.
                    None if topic_changed => Some(String::new()),
                    None => None,
                };
                InboundEvent::MemberUpdated {
                    member_id,
                    group_id: non_empty(self.group_id),
                    name: non_empty(self.member_name),
                    topic,
                    position: self.position,
                }
            }
            _ => return Err(EventParseError::UnknownEventType(event_type)),
        };

        Ok(Parsed::Event(meta, event))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require(
    event_type: &'static str,
    field: &'static str,
    value: Option<String>,
) -> Result<String, EventParseError> {
    non_empty(value).ok_or(EventParseError::MissingEventField { event_type, field })
}
