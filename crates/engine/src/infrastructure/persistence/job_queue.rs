//! SQLite-backed job queue.
//!
//! The queue holds envelopes only; the `jobs` table stays the record of what
//! has to happen. Losing the queue is therefore recoverable: startup
//! reconciliation re-enqueues every Pending job.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use guildcraft_domain::JobEnvelope;

use crate::infrastructure::ports::{JobQueue, QueueError};

pub struct SqliteJobQueue {
    pool: SqlitePool,
}

impl SqliteJobQueue {
    pub async fn new(pool: SqlitePool) -> Result<Self, QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL,
                envelope TEXT NOT NULL,
                enqueued_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn push(&self, envelope: &JobEnvelope) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO job_queue (job_id, envelope, enqueued_at) VALUES (?, ?, ?)")
            .bind(envelope.job_id.to_string())
            .bind(envelope.to_json()?)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<JobEnvelope>, QueueError> {
        // Single statement, so two consumers can never take the same row.
        let raw: Option<String> = sqlx::query_scalar(
            r#"
            DELETE FROM job_queue
            WHERE seq = (SELECT MIN(seq) FROM job_queue)
            RETURNING envelope
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        raw.map(|json| JobEnvelope::from_json(&json).map_err(QueueError::from))
            .transpose()
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn clear(&self) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM job_queue")
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(())
    }
}
