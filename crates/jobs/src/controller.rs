//! Public entry point for computing analysis jobs.
//!
//! [`JobController`] routes a [`Job`] to the single or batch
//! orchestrator by its variant and owns the master cancellation token
//! every computation it starts is tied to.

use std::sync::Arc;

use analysis_core::{Job, SharedBatch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::HttpAnalysisService;
use crate::batch::{BatchHandle, BatchOrchestrator, BatchReport};
use crate::config::{ClientConfig, Filters};
use crate::error::JobError;
use crate::orchestrator::{JobOutcome, SingleJobOrchestrator};
use crate::service::{AnalysisService, ServiceError};
use crate::status::StatusBoard;

/// Resolution of [`JobController::compute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Job(JobOutcome),
    Batch(BatchReport),
}

/// Cheap to clone; clones share orchestrators, status board and
/// cancellation.
#[derive(Clone)]
pub struct JobController {
    single: Arc<SingleJobOrchestrator>,
    batch: Arc<BatchOrchestrator>,
    status: Arc<StatusBoard>,
    cancel: CancellationToken,
}

impl JobController {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        config: &ClientConfig,
        status: Arc<StatusBoard>,
    ) -> Self {
        let single = Arc::new(SingleJobOrchestrator::new(service, config));
        let batch = Arc::new(BatchOrchestrator::new(
            Arc::clone(&single),
            Arc::clone(&status),
        ));
        Self {
            single,
            batch,
            status,
            cancel: CancellationToken::new(),
        }
    }

    /// Build a controller talking HTTP to `config.api_url`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ServiceError> {
        let service = HttpAnalysisService::from_config(config)?;
        Ok(Self::new(
            Arc::new(service),
            config,
            Arc::new(StatusBoard::new()),
        ))
    }

    pub fn status_board(&self) -> &Arc<StatusBoard> {
        &self.status
    }

    /// Compute a single job or a batch, resolving once it settles.
    pub async fn compute(
        &self,
        job: &Job,
        filters: Option<&Filters>,
    ) -> Result<Completion, JobError> {
        let token = self.cancel.child_token();
        match job {
            Job::Single(model) => self
                .single
                .compute_with_cancel(model, filters, &token)
                .await
                .map(Completion::Job),
            Job::Batch(batch) => self
                .batch
                .compute_batch_with_cancel(batch, filters, &token)
                .await
                .map(Completion::Batch),
        }
    }

    #[deprecated(note = "use `compute`")]
    pub async fn compute_analysis(
        &self,
        job: &Job,
        filters: Option<&Filters>,
    ) -> Result<Completion, JobError> {
        self.compute(job, filters).await
    }

    /// Run [`compute`](Self::compute) on a background task.
    pub fn spawn(
        &self,
        job: Job,
        filters: Option<Filters>,
    ) -> JoinHandle<Result<Completion, JobError>> {
        let controller = self.clone();
        tokio::spawn(async move { controller.compute(&job, filters.as_ref()).await })
    }

    /// Start a batch in the background with its own cancellable handle.
    pub fn spawn_batch(&self, batch: SharedBatch, filters: Option<Filters>) -> BatchHandle {
        self.batch
            .spawn_batch(batch, filters, self.cancel.child_token())
    }

    /// Cancel every computation started by this controller (and its
    /// clones). Running jobs settle as cancelled.
    pub fn shutdown(&self) {
        tracing::info!("Cancelling in-flight analysis computations");
        self.cancel.cancel();
    }
}
