//! Change notifications emitted by job and batch models.
//!
//! Models own a [`tokio::sync::broadcast`] sender; observers call
//! `subscribe()` on the model to receive these events. Sending never
//! blocks and is dropped silently when nobody listens.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::JobStatus;
use crate::types::DimensionRef;

/// Broadcast channel capacity for per-model events.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub enum JobEvent {
    /// The lifecycle status moved forward.
    StatusChanged {
        status: JobStatus,
        at: DateTime<Utc>,
    },

    /// The dimension list was rebuilt or one entry was replaced.
    DimensionsChanged(Vec<DimensionRef>),

    /// The model reached `DONE`. Emitted once per lifecycle.
    Settled { failed: bool },
}
