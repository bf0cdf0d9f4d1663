//! The analysis service as seen by the orchestrators.
//!
//! [`AnalysisService`] is the seam between orchestration and transport:
//! the HTTP client implements it for production, tests script it.

use analysis_core::{
    DimensionRef, DomainRef, JobFailure, JobIdentity, JobModel, JobStatus, MetricRef,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `apiError` value the service uses while a job has no result yet.
pub const COMPUTING_IN_PROGRESS: &str = "COMPUTING_IN_PROGRESS";

/// Default result format query parameter.
pub const DEFAULT_FORMAT: &str = "json";

/// Default result compression query parameter.
pub const DEFAULT_COMPRESSION: &str = "none";

/// Remote service that runs analysis jobs.
///
/// Both operations return the raw JSON body; interpreting it is the
/// orchestrator's job.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Create (and start) an analysis job.
    async fn create(&self, request: &CreateJobRequest) -> Result<Value, ServiceError>;

    /// Retrieve the results of a submitted job.
    async fn fetch(&self, id: &JobIdentity, params: &ResultParams) -> Result<Value, ServiceError>;
}

/// Body of a job creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub id: JobIdentity,
    pub domains: Vec<DomainRef>,
    pub dimensions: Vec<DimensionRef>,
    pub metrics: Vec<MetricRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_run: Option<bool>,
    pub selection: Option<Value>,
}

impl CreateJobRequest {
    /// Build a request from the job's parameters and the resolved
    /// selection. The job id is always sent unassigned.
    pub fn from_model(job: &JobModel, selection: Option<Value>) -> Self {
        Self {
            id: JobIdentity::unassigned(job.project_id().clone()),
            domains: job.domains().to_vec(),
            dimensions: job.dimensions().to_vec(),
            metrics: job.metrics().to_vec(),
            auto_run: job.auto_run(),
            selection,
        }
    }
}

/// Query parameters passed through to the results endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultParams {
    pub format: String,
    pub compression: String,
}

impl Default for ResultParams {
    fn default() -> Self {
        Self {
            format: DEFAULT_FORMAT.to_string(),
            compression: DEFAULT_COMPRESSION.to_string(),
        }
    }
}

/// Job record as returned by the create endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    #[serde(default)]
    pub id: Option<JobIdentity>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl JobRecord {
    pub fn from_response(body: &Value) -> Result<Self, ServiceError> {
        Ok(Self::deserialize(body)?)
    }

    pub fn is_done(&self) -> bool {
        self.status == Some(JobStatus::Done)
    }

    /// Identity, if the service assigned a job id.
    pub fn assigned_id(&self) -> Option<&JobIdentity> {
        self.id.as_ref().filter(|id| id.is_assigned())
    }
}

/// Errors raised by an [`AnalysisService`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("Analysis API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The body could not be interpreted.
    #[error("Malformed analysis API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Any other transport failure.
    #[error("Analysis service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Convert into the failure recorded on the job.
    ///
    /// API errors whose body is a JSON error object keep that object;
    /// everything else becomes a plain message.
    pub fn to_failure(&self) -> JobFailure {
        if let Self::Api { status, body } = self {
            if let Ok(failure) = serde_json::from_str::<JobFailure>(body) {
                if !failure.message.is_empty() {
                    return failure;
                }
            }
            return JobFailure::new(self.to_string()).with_code(status.to_string());
        }
        JobFailure::new(self.to_string())
    }

    /// The JSON body the service answered with, for API errors that
    /// carried one.
    pub fn response_body(&self) -> Option<Value> {
        match self {
            Self::Api { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use analysis_core::Oid;
    use serde_json::json;

    use super::*;

    #[test]
    fn create_request_carries_job_parameters() {
        let mut job = JobModel::new(1);
        job.set_domain_ids([10]);
        job.set_metric_ids(["count"]).unwrap();
        job.set_auto_run(Some(true));

        let request = CreateJobRequest::from_model(&job, Some(json!({"filter": "x"})));
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["id"], json!({"projectId": "1", "analysisJobId": null}));
        assert_eq!(body["domains"][0]["domainId"], json!("10"));
        assert_eq!(body["metrics"][0]["metricId"], json!("count"));
        assert_eq!(body["autoRun"], json!(true));
        assert_eq!(body["selection"], json!({"filter": "x"}));
    }

    #[test]
    fn record_without_id_parses() {
        let record = JobRecord::from_response(
            &json!({"status": "DONE", "error": {"message": "bad selection"}}),
        )
        .unwrap();
        assert!(record.is_done());
        assert!(record.id.is_none());
        assert_eq!(record.error.unwrap().message, "bad selection");
    }

    #[test]
    fn assigned_id_requires_job_id() {
        let record = JobRecord::from_response(
            &json!({"id": {"projectId": 1, "analysisJobId": 42}, "status": "RUNNING"}),
        )
        .unwrap();
        let id = record.assigned_id().unwrap();
        assert_eq!(id.analysis_job_id, Some(Oid::from(42)));

        let unassigned = JobRecord::from_response(
            &json!({"id": {"projectId": 1, "analysisJobId": null}, "status": "RUNNING"}),
        )
        .unwrap();
        assert!(unassigned.assigned_id().is_none());
    }

    #[test]
    fn api_error_with_json_body_keeps_service_failure() {
        let err = ServiceError::Api {
            status: 400,
            body: r#"{"message":"invalid domain","errorCode":7}"#.into(),
        };
        let failure = err.to_failure();
        assert_eq!(failure.message, "invalid domain");
        assert_eq!(failure.extra.get("errorCode"), Some(&json!(7)));
        assert_eq!(err.response_body().unwrap()["errorCode"], json!(7));
    }

    #[test]
    fn api_error_with_text_body_uses_status_code() {
        let err = ServiceError::Api {
            status: 502,
            body: "Bad Gateway".into(),
        };
        let failure = err.to_failure();
        assert_eq!(failure.code.as_deref(), Some("502"));
        assert!(failure.message.contains("Bad Gateway"));
        assert!(err.response_body().is_none());
    }
}
