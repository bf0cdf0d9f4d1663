//! Client-side orchestration of remote analysis jobs.
//!
//! Submits jobs to the analysis service, polls for results while the
//! service reports the job as still computing, and writes the outcome
//! into the caller's [`JobModel`](analysis_core::JobModel). Batches fan
//! out one computation per child and settle once every child has.
//!
//! [`controller::JobController`] is the entry point; the service itself
//! is reached through the [`service::AnalysisService`] trait, with
//! [`api::HttpAnalysisService`] as the HTTP implementation.

pub mod api;
pub mod batch;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetcher;
pub mod orchestrator;
pub mod poll;
pub mod service;
pub mod status;

pub use batch::{BatchHandle, BatchOrchestrator, BatchReport};
pub use config::{ClientConfig, ConfigError, Filters};
pub use controller::{Completion, JobController};
pub use error::{JobError, Rejection};
pub use fetcher::{FetchOutcome, ResultFetcher};
pub use orchestrator::{JobOutcome, SingleJobOrchestrator};
pub use poll::PollConfig;
pub use service::{AnalysisService, CreateJobRequest, JobRecord, ResultParams, ServiceError};
pub use status::StatusBoard;
