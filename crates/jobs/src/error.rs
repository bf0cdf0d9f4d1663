//! Errors returned by the orchestrators and the controller.

use std::fmt;

use analysis_core::{CoreError, JobFailure};
use serde_json::Value;

use crate::batch::BatchReport;

/// A job failure together with the service response that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub failure: JobFailure,
    /// Raw body the service answered with. `None` for transport errors
    /// and for failures detected client-side.
    pub response: Option<Value>,
}

impl Rejection {
    pub fn new(failure: JobFailure, response: Option<Value>) -> Self {
        Self { failure, response }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.failure.fmt(f)
    }
}

/// Why a computation was rejected.
///
/// Every variant except [`JobError::AlreadySettled`],
/// [`JobError::AlreadyRunning`] and [`JobError::Aborted`] is also
/// recorded on the job model before it is returned.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The create call failed, or the service settled the job with an
    /// error straight away.
    #[error("Analysis job submission failed: {0}")]
    Submission(Rejection),

    /// A result fetch failed.
    #[error("Analysis job result retrieval failed: {0}")]
    Fetch(Rejection),

    /// The service kept reporting "still computing" past the poll budget.
    #[error("Analysis job timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Analysis job computation cancelled")]
    Cancelled,

    /// The job already reached `DONE`; reset it to compute again.
    #[error("Analysis job already settled")]
    AlreadySettled,

    #[error("Analysis job is already being computed")]
    AlreadyRunning,

    /// At least one child of a batch failed. Siblings ran to completion.
    #[error("{} of {} analysis jobs failed", .0.failed, .0.total)]
    PartialFailure(Box<BatchReport>),

    /// The task driving the computation panicked or was aborted.
    #[error("Computation task aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl JobError {
    /// The failure recorded on the job, when the variant carries one.
    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            Self::Submission(rejection) | Self::Fetch(rejection) => Some(&rejection.failure),
            Self::PartialFailure(report) => report.error.as_ref(),
            _ => None,
        }
    }

    /// Raw service response behind a submission or fetch rejection.
    pub fn response(&self) -> Option<&Value> {
        match self {
            Self::Submission(rejection) | Self::Fetch(rejection) => rejection.response.as_ref(),
            _ => None,
        }
    }
}
