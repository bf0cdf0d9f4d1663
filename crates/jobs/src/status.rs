//! Shared advisory status for batch computations.
//!
//! [`StatusBoard`] is the one piece of state touched by concurrent batch
//! children. It is shared via `Arc<StatusBoard>` and writes are
//! last-write-wins behind a lock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// Message reported when any job of a batch failed.
pub const COMPUTATION_FAILED: &str = "Computation failed";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub message: Option<String>,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: RwLock<StatusSnapshot>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both the message and the error to `message`.
    pub async fn report_failure(&self, message: &str) {
        let mut status = self.inner.write().await;
        status.message = Some(message.to_string());
        status.error = Some(message.to_string());
        status.updated_at = Some(Utc::now());
    }

    pub async fn clear(&self) {
        *self.inner.write().await = StatusSnapshot {
            updated_at: Some(Utc::now()),
            ..Default::default()
        };
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().await.clone()
    }
}
