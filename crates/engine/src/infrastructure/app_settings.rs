//! Engine settings.
//!
//! Every value has a default, so an empty environment yields a runnable
//! engine pointed at a local server. Overrides come from `GUILDCRAFT_*`
//! environment variables, with `__` separating nested keys:
//!
//! ```text
//! GUILDCRAFT_SERVER__PORT=8080
//! GUILDCRAFT_RCON__PASSWORD=secret
//! GUILDCRAFT_LAYOUT__TOPOLOGY=all_pairs
//! GUILDCRAFT_WORKER__RETRY_BASE_MS=2000
//! ```

use std::time::Duration;

use guildcraft_domain::LayoutConfig;
use serde::{Deserialize, Serialize};

use crate::infrastructure::command_channel::ThrottleConfig;

pub const ENV_PREFIX: &str = "GUILDCRAFT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub rcon: RconSettings,
    pub throttle: ThrottleConfig,
    pub worker: WorkerSettings,
    pub layout: LayoutConfig,
}

impl EngineSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let source = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(source)
    }

    pub fn from_config(source: config::Config) -> Result<Self, config::ConfigError> {
        let settings: Self = source.try_deserialize()?;
        settings
            .layout
            .validate()
            .map_err(|e| config::ConfigError::Message(format!("layout: {e}")))?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Comma-separated origins, `*` for any. Empty disables CORS.
    pub cors_allowed_origins: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_allowed_origins: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    /// Durable table next to the world store.
    #[default]
    Sqlite,
    /// Lost on restart; rebuilt from Pending jobs at startup.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file, or `:memory:`.
    pub path: String,
    pub max_connections: u32,
    pub queue_backend: QueueBackend,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "./data/guildcraft.db".into(),
            max_connections: 5,
            queue_backend: QueueBackend::Sqlite,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RconSettings {
    /// `host:port` of the world server's RCON listener.
    pub address: String,
    pub password: String,
    pub timeout_ms: u64,
}

impl Default for RconSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:25575".into(),
            password: String::new(),
            timeout_ms: 5_000,
        }
    }
}

impl RconSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Pause between polls of an empty queue.
    pub idle_poll_ms: u64,
    /// Attempts per job, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per further attempt.
    pub retry_base_ms: u64,
    /// In-progress jobs older than this are reset at startup.
    pub stale_after_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            idle_poll_ms: 500,
            max_attempts: 3,
            retry_base_ms: 2_000,
            stale_after_secs: 0,
        }
    }
}
