//! One result-retrieval attempt, classified.
//!
//! [`ResultFetcher::fetch`] performs a single call to the results
//! endpoint and turns the answer into a [`FetchOutcome`]. Retrying is
//! left to the caller.

use std::sync::Arc;

use analysis_core::{JobFailure, JobIdentity, JobStatus};
use serde_json::Value;

use crate::service::{AnalysisService, ResultParams, COMPUTING_IN_PROGRESS};

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The job finished. `payload` is the result, `response` the raw body
    /// it came in.
    Done { payload: Value, response: Value },
    /// The job exists but has no result yet.
    StillComputing,
    /// Transport error or an application error other than "still computing".
    /// `response` is the body the service answered with, if any.
    Failed {
        failure: JobFailure,
        response: Option<Value>,
    },
}

pub struct ResultFetcher {
    service: Arc<dyn AnalysisService>,
    params: ResultParams,
}

impl ResultFetcher {
    pub fn new(service: Arc<dyn AnalysisService>, params: ResultParams) -> Self {
        Self { service, params }
    }

    pub async fn fetch(&self, id: &JobIdentity) -> FetchOutcome {
        match self.service.fetch(id, &self.params).await {
            Ok(body) => classify(body),
            Err(e) => {
                tracing::warn!(
                    project_id = %id.project_id,
                    analysis_job_id = ?id.analysis_job_id,
                    error = %e,
                    "Result fetch failed",
                );
                FetchOutcome::Failed {
                    failure: e.to_failure(),
                    response: e.response_body(),
                }
            }
        }
    }
}

/// Classify a successful response body from the results endpoint.
///
/// - `apiError == "COMPUTING_IN_PROGRESS"`, or a non-terminal `status`,
///   means still computing.
/// - Any other `apiError`, or an `error` object, is a failure.
/// - Otherwise the job is done; the payload is the body's `results`
///   field when present, else the whole body.
pub fn classify(body: Value) -> FetchOutcome {
    match body.get("apiError").and_then(Value::as_str) {
        Some(COMPUTING_IN_PROGRESS) => return FetchOutcome::StillComputing,
        Some(api_error) => {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(api_error)
                .to_string();
            let failure = JobFailure::new(message).with_code(api_error);
            return FetchOutcome::Failed {
                failure,
                response: Some(body),
            };
        }
        None => {}
    }

    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let failure = serde_json::from_value::<JobFailure>(error.clone())
            .unwrap_or_else(|_| JobFailure::new(error.to_string()));
        return FetchOutcome::Failed {
            failure,
            response: Some(body),
        };
    }

    let status = body
        .get("status")
        .cloned()
        .and_then(|s| serde_json::from_value::<JobStatus>(s).ok());
    if matches!(status, Some(JobStatus::Pending | JobStatus::Running)) {
        return FetchOutcome::StillComputing;
    }

    let payload = body.get("results").cloned().unwrap_or_else(|| body.clone());
    FetchOutcome::Done {
        payload,
        response: body,
    }
}
