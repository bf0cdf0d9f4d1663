//! Data entities for analysis job orchestration.
//!
//! Holds the caller-owned job and batch models that orchestrators mutate
//! in place, the identifiers and references they carry, and the change
//! events observers subscribe to. Nothing in this crate touches the
//! network.

pub mod error;
pub mod events;
pub mod model;
pub mod types;

pub use error::CoreError;
pub use events::JobEvent;
pub use model::{
    BatchModel, Job, JobFailure, JobModel, JobStatus, SharedBatch, SharedJob,
};
pub use types::{DimensionRef, DomainRef, JobIdentity, MetricRef, Oid};
