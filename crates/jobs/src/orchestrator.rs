//! Drives one analysis job through submit → poll → settle.
//!
//! The job model is locked only to read parameters or write outcomes;
//! the lock is never held while a network call is in flight, so
//! observers can read the model at any time.

use std::sync::Arc;

use analysis_core::{JobFailure, JobIdentity, JobStatus, Oid, SharedJob};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, Filters};
use crate::error::{JobError, Rejection};
use crate::fetcher::{FetchOutcome, ResultFetcher};
use crate::poll::{PollBudget, PollConfig};
use crate::service::{AnalysisService, CreateJobRequest, JobRecord};

/// What a successful computation resolves with.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// Identity of the job on the service. Unassigned when the service
    /// completed the job synchronously without returning one.
    pub id: JobIdentity,
    pub results: Option<Value>,
    /// Parsed create record, when the job completed on submission.
    pub record: Option<JobRecord>,
    /// Raw body of the response that settled the job.
    pub response: Value,
}

pub struct SingleJobOrchestrator {
    service: Arc<dyn AnalysisService>,
    fetcher: ResultFetcher,
    poll: PollConfig,
    default_filters: Filters,
    default_domain_id: Option<Oid>,
}

impl SingleJobOrchestrator {
    pub fn new(service: Arc<dyn AnalysisService>, config: &ClientConfig) -> Self {
        Self {
            fetcher: ResultFetcher::new(Arc::clone(&service), config.result_params.clone()),
            service,
            poll: config.poll.clone(),
            default_filters: config.default_filters.clone(),
            default_domain_id: config.default_domain_id.clone(),
        }
    }

    /// Compute `job` to settlement.
    ///
    /// The selection sent is the job's own, else the one in `filters`,
    /// else the configured default.
    pub async fn compute(
        &self,
        job: &SharedJob,
        filters: Option<&Filters>,
    ) -> Result<JobOutcome, JobError> {
        self.compute_with_cancel(job, filters, &CancellationToken::new())
            .await
    }

    /// Like [`compute`](Self::compute), settling the job as cancelled
    /// when `cancel` fires before it completes.
    pub async fn compute_with_cancel(
        &self,
        job: &SharedJob,
        filters: Option<&Filters>,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, JobError> {
        let request = self.begin(job, filters).await?;
        let project_id = request.id.project_id.clone();

        tracing::info!(project_id = %project_id, "Submitting analysis job");

        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.abort(job).await,
            result = self.service.create(&request) => result,
        };

        let body = match created {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(project_id = %project_id, error = %e, "Analysis job submission failed");
                let response = e.response_body();
                return reject_submission(job, e.to_failure(), response).await;
            }
        };

        let record = match JobRecord::from_response(&body) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(project_id = %project_id, error = %e, "Malformed analysis job record");
                return reject_submission(job, e.to_failure(), Some(body)).await;
            }
        };

        if let Some(failure) = record.error.clone() {
            tracing::error!(
                project_id = %project_id,
                error = %failure,
                "Analysis job rejected by service",
            );
            return reject_submission(job, failure, Some(body)).await;
        }

        if record.is_done() {
            tracing::info!(project_id = %project_id, "Analysis job completed on submission");
            let id = record.id.clone().unwrap_or(request.id);
            job.lock().await.settle_success(record.results.clone())?;
            return Ok(JobOutcome {
                id,
                results: record.results.clone(),
                record: Some(record),
                response: body,
            });
        }

        let Some(id) = record.assigned_id().cloned() else {
            let failure = JobFailure::new("Analysis service returned no analysis job id");
            tracing::error!(project_id = %project_id, "{}", failure.message);
            return reject_submission(job, failure, Some(body)).await;
        };

        tracing::info!(
            project_id = %project_id,
            analysis_job_id = ?id.analysis_job_id,
            "Analysis job submitted",
        );
        job.lock().await.assign_identity(id.clone());

        self.poll_results(job, id, cancel).await
    }

    /// Fetch results until the job is done, failed, out of budget, or
    /// cancelled. Fetches are strictly sequential.
    async fn poll_results(
        &self,
        job: &SharedJob,
        id: JobIdentity,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, JobError> {
        let mut budget = PollBudget::start(&self.poll);

        loop {
            let attempt = budget.record_attempt();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.abort(job).await,
                outcome = self.fetcher.fetch(&id) => outcome,
            };

            match outcome {
                FetchOutcome::Done { payload, response } => {
                    tracing::info!(
                        analysis_job_id = ?id.analysis_job_id,
                        attempt,
                        "Analysis job results retrieved",
                    );
                    job.lock().await.settle_success(Some(payload.clone()))?;
                    return Ok(JobOutcome {
                        id,
                        results: Some(payload),
                        record: None,
                        response,
                    });
                }
                FetchOutcome::Failed { failure, response } => {
                    tracing::error!(
                        analysis_job_id = ?id.analysis_job_id,
                        attempt,
                        error = %failure,
                        "Analysis job failed",
                    );
                    settle_failure(job, failure.clone()).await?;
                    return Err(JobError::Fetch(Rejection::new(failure, response)));
                }
                FetchOutcome::StillComputing => {
                    let Some(delay) = budget.next_wait() else {
                        let attempts = budget.attempts();
                        tracing::warn!(
                            analysis_job_id = ?id.analysis_job_id,
                            attempts,
                            "Analysis job poll budget exhausted",
                        );
                        settle_failure(job, JobFailure::timeout(attempts)).await?;
                        return Err(JobError::Timeout { attempts });
                    };

                    tracing::debug!(
                        analysis_job_id = ?id.analysis_job_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Analysis job still computing",
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.abort(job).await,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    // ---- private helpers ----

    /// Check the job can start, mark it running, and build the request.
    ///
    /// A job without domains gets the configured default domain.
    async fn begin(
        &self,
        job: &SharedJob,
        filters: Option<&Filters>,
    ) -> Result<CreateJobRequest, JobError> {
        let mut model = job.lock().await;
        match model.status() {
            JobStatus::Done => return Err(JobError::AlreadySettled),
            JobStatus::Running => return Err(JobError::AlreadyRunning),
            JobStatus::Pending => {}
        }

        let selection = model
            .selection()
            .cloned()
            .or_else(|| filters.and_then(|f| f.selection.clone()))
            .or_else(|| self.default_filters.selection.clone());

        if model.domains().is_empty() {
            if let Some(domain_id) = &self.default_domain_id {
                model.set_domain_ids([domain_id.clone()]);
            }
        }
        model.advance(JobStatus::Running)?;
        Ok(CreateJobRequest::from_model(&model, selection))
    }

    async fn abort(&self, job: &SharedJob) -> Result<JobOutcome, JobError> {
        tracing::info!("Analysis job computation cancelled");
        settle_failure(job, JobFailure::cancelled()).await?;
        Err(JobError::Cancelled)
    }
}

async fn reject_submission(
    job: &SharedJob,
    failure: JobFailure,
    response: Option<Value>,
) -> Result<JobOutcome, JobError> {
    settle_failure(job, failure.clone()).await?;
    Err(JobError::Submission(Rejection::new(failure, response)))
}

async fn settle_failure(job: &SharedJob, failure: JobFailure) -> Result<(), JobError> {
    job.lock().await.settle_failure(failure)?;
    Ok(())
}
