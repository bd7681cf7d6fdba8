//! Shared test helpers.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_fixtures::{temp_store, group_upsert};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let t = temp_store(LayoutConfig::default()).await;
//!     t.store.upsert_group(group_upsert("g", "Lobby")).await.expect("g");
//! }
//! ```

pub mod voxel;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use guildcraft_domain::LayoutConfig;
use tempfile::TempDir;

use crate::infrastructure::clock::FixedClock;
use crate::infrastructure::persistence::{connect, SqliteWorldStore};
use crate::infrastructure::ports::{CommandError, CommandSink, GroupUpsert, MemberUpsert};

pub use voxel::VoxelWorld;

// =============================================================================
// Store Fixtures
// =============================================================================

/// A store on a fresh SQLite file, with a clock the test controls.
pub struct TempStore {
    pub store: Arc<SqliteWorldStore>,
    pub clock: Arc<FixedClock>,
    _dir: TempDir,
}

pub async fn temp_store(layout: LayoutConfig) -> TempStore {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("world.db");
    let pool = connect(&path.to_string_lossy(), 2)
        .await
        .expect("connect");
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0)
            .single()
            .expect("valid start time"),
    ));
    let store = SqliteWorldStore::new(pool, layout, clock.clone())
        .await
        .expect("store");
    TempStore {
        store: Arc::new(store),
        clock,
        _dir: dir,
    }
}

pub fn group_upsert(external_id: &str, name: &str) -> GroupUpsert {
    GroupUpsert {
        external_id: external_id.to_string(),
        name: name.to_string(),
        position: 0,
    }
}

pub fn member_upsert(external_id: &str, group_external_id: &str, name: &str) -> MemberUpsert {
    MemberUpsert {
        external_id: external_id.to_string(),
        group_external_id: group_external_id.to_string(),
        name: name.to_string(),
        topic: None,
        position: 0,
    }
}

// =============================================================================
// Command Sink Fixtures
// =============================================================================

/// [`CommandSink`] that records what it was sent. Optionally fails the first
/// few batches, to exercise retries.
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<String>>>,
    failures_left: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` calls with an I/O error.
    pub fn failing(times: usize) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(times),
        }
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().expect("batches").clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.batches().into_iter().flatten().collect()
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn send(&self, command: String) -> Result<String, CommandError> {
        self.send_batch(vec![command])
            .await
            .map(|mut replies| replies.pop().unwrap_or_default())
    }

    async fn send_batch(&self, commands: Vec<String>) -> Result<Vec<String>, CommandError> {
        if self.take_failure() {
            return Err(CommandError::Io("connection reset by peer".into()));
        }
        let replies = commands.iter().map(|_| String::new()).collect();
        self.batches.lock().expect("batches").push(commands);
        Ok(replies)
    }
}
