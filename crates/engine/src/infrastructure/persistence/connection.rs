//! SQLite connection management

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::infrastructure::ports::RepoError;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the database at `path`.
///
/// `:memory:` is accepted for throwaway stores; the pool is then pinned to a
/// single connection so every query sees the same database.
pub async fn connect(path: &str, max_connections: u32) -> Result<SqlitePool, RepoError> {
    let in_memory = path == ":memory:";
    let url = if in_memory {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite:{path}")
    };

    let options = SqliteConnectOptions::from_str(&url)
        .map_err(|e| RepoError::database("connect", e))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
        .journal_mode(if in_memory {
            SqliteJournalMode::Memory
        } else {
            SqliteJournalMode::Wal
        });

    let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
    if in_memory {
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| RepoError::database("connect", e))?;

    tracing::info!(path = %path, "Opened SQLite database");
    Ok(pool)
}
