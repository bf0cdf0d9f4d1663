//! Fan-out/fan-in computation of a batch of jobs.
//!
//! Every child runs through its own [`SingleJobOrchestrator`]
//! computation concurrently. The batch settles only after all children
//! have; a failing child never cancels its siblings.

use std::sync::Arc;

use analysis_core::{JobFailure, JobStatus, SharedBatch};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Filters;
use crate::error::JobError;
use crate::orchestrator::SingleJobOrchestrator;
use crate::status::{StatusBoard, COMPUTATION_FAILED};

/// Aggregate outcome of a settled batch.
///
/// Per-child results and errors stay on the child models.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub total: usize,
    /// Children whose computation was rejected.
    pub rejected: usize,
    /// Children that ended with an error on their model.
    pub failed: usize,
    /// Error of the last failed child in batch order.
    pub error: Option<JobFailure>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.total - self.failed
    }
}

pub struct BatchOrchestrator {
    single: Arc<SingleJobOrchestrator>,
    status: Arc<StatusBoard>,
}

impl BatchOrchestrator {
    pub fn new(single: Arc<SingleJobOrchestrator>, status: Arc<StatusBoard>) -> Self {
        Self { single, status }
    }

    pub async fn compute_batch(
        &self,
        batch: &SharedBatch,
        filters: Option<&Filters>,
    ) -> Result<BatchReport, JobError> {
        self.compute_batch_with_cancel(batch, filters, &CancellationToken::new())
            .await
    }

    /// Compute every child of `batch` and settle the batch.
    ///
    /// The whole batch is refused when it, or any of its children, is
    /// not pending. Each child gets a child token of `cancel`, so
    /// cancelling it settles all unfinished children as cancelled.
    pub async fn compute_batch_with_cancel(
        &self,
        batch: &SharedBatch,
        filters: Option<&Filters>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, JobError> {
        let children = {
            let mut model = batch.lock().await;
            match model.status() {
                JobStatus::Done => return Err(JobError::AlreadySettled),
                JobStatus::Running => return Err(JobError::AlreadyRunning),
                JobStatus::Pending => {}
            }
            for child in model.children() {
                match child.lock().await.status() {
                    JobStatus::Done => return Err(JobError::AlreadySettled),
                    JobStatus::Running => return Err(JobError::AlreadyRunning),
                    JobStatus::Pending => {}
                }
            }
            model.advance(JobStatus::Running)?;
            model.children().to_vec()
        };

        tracing::info!(count = children.len(), "Computing analysis batch");

        let runs = children.iter().map(|child| {
            let token = cancel.child_token();
            async move { self.single.compute_with_cancel(child, filters, &token).await }
        });
        let results = join_all(runs).await;

        let rejected = results.iter().filter(|r| r.is_err()).count();
        if rejected > 0 {
            tracing::warn!(rejected, total = children.len(), "Analysis batch had failures");
            self.status.report_failure(COMPUTATION_FAILED).await;
        }

        let mut failed = 0;
        let mut error = None;
        for child in &children {
            if let Some(child_error) = child.lock().await.error() {
                failed += 1;
                error = Some(child_error.clone());
            }
        }

        batch.lock().await.settle(error.clone())?;

        let report = BatchReport {
            total: children.len(),
            rejected,
            failed,
            error,
        };
        tracing::info!(
            total = report.total,
            failed = report.failed,
            "Analysis batch settled",
        );

        if report.rejected > 0 || report.failed > 0 {
            Err(JobError::PartialFailure(Box::new(report)))
        } else {
            Ok(report)
        }
    }

    /// Run the batch on a background task and return a handle to await
    /// or cancel it. The batch model is updated in place either way.
    pub fn spawn_batch(
        self: &Arc<Self>,
        batch: SharedBatch,
        filters: Option<Filters>,
        cancel: CancellationToken,
    ) -> BatchHandle {
        let orchestrator = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            orchestrator
                .compute_batch_with_cancel(&batch, filters.as_ref(), &token)
                .await
        });
        BatchHandle { task, cancel }
    }
}

/// Handle to a batch running in the background.
pub struct BatchHandle {
    task: JoinHandle<Result<BatchReport, JobError>>,
    cancel: CancellationToken,
}

impl BatchHandle {
    /// Cancel every child that has not settled yet.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the batch to settle.
    pub async fn join(self) -> Result<BatchReport, JobError> {
        self.task
            .await
            .map_err(|e| JobError::Aborted(e.to_string()))?
    }
}
