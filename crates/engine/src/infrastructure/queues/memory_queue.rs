//! In-memory job queue for development and testing
//!
//! Nothing is persisted. After a restart the queue is rebuilt from the
//! Pending rows in the store.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use guildcraft_domain::JobEnvelope;

use crate::infrastructure::ports::{JobQueue, QueueError};

#[derive(Default)]
pub struct InMemoryJobQueue {
    items: Mutex<VecDeque<JobEnvelope>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn push(&self, envelope: &JobEnvelope) -> Result<(), QueueError> {
        self.items.lock().await.push_back(envelope.clone());
        Ok(())
    }

    async fn pop(&self) -> Result<Option<JobEnvelope>, QueueError> {
        Ok(self.items.lock().await.pop_front())
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        Ok(self.items.lock().await.len())
    }

    async fn clear(&self) -> Result<(), QueueError> {
        self.items.lock().await.clear();
        Ok(())
    }
}
