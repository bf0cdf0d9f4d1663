//! Caller-owned job and batch models.
//!
//! Orchestrators never take ownership of a model: they hold a clone of
//! the [`SharedJob`] / [`SharedBatch`] handle and mutate the model in
//! place, so anyone watching the same instance observes every status
//! transition.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use crate::error::CoreError;
use crate::events::{JobEvent, EVENT_CHANNEL_CAPACITY};
use crate::types::{DimensionRef, DomainRef, JobIdentity, MetricRef, Oid};

/// Failure code recorded when polling gave up.
pub const FAILURE_CODE_TIMEOUT: &str = "TIMEOUT";

/// Failure code recorded when a computation was cancelled.
pub const FAILURE_CODE_CANCELLED: &str = "CANCELLED";

pub type SharedJob = Arc<Mutex<JobModel>>;
pub type SharedBatch = Arc<Mutex<BatchModel>>;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status shared by jobs and batches.
///
/// Ordered `Pending < Running < Done`; models only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
        }
    }

    /// Check that moving from `self` to `to` is a forward transition.
    pub fn check_advance(self, to: JobStatus) -> Result<(), CoreError> {
        if to > self {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobFailure
// ---------------------------------------------------------------------------

/// Error payload recorded on a failed job: `{message, ...}`.
///
/// Fields the service sends beyond `message` and `code` are kept in
/// `extra` so nothing is lost on the way to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl JobFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Failure recorded when the poll loop exhausted its budget.
    pub fn timeout(attempts: u32) -> Self {
        Self::new(format!(
            "Analysis job still computing after {attempts} attempts"
        ))
        .with_code(FAILURE_CODE_TIMEOUT)
    }

    pub fn cancelled() -> Self {
        Self::new("Analysis job computation cancelled").with_code(FAILURE_CODE_CANCELLED)
    }

    pub fn is_timeout(&self) -> bool {
        self.code.as_deref() == Some(FAILURE_CODE_TIMEOUT)
    }

    pub fn is_cancelled(&self) -> bool {
        self.code.as_deref() == Some(FAILURE_CODE_CANCELLED)
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// JobModel
// ---------------------------------------------------------------------------

/// State of one analysis job: identity, parameters, status and outcome.
///
/// Invariants:
/// - `status` only moves forward and reaches `Done` once per lifecycle.
/// - A `Done` job with an `error` has no `results`.
#[derive(Debug)]
pub struct JobModel {
    id: JobIdentity,
    oid: Option<Oid>,
    domains: Vec<DomainRef>,
    dimensions: Vec<DimensionRef>,
    metrics: Vec<MetricRef>,
    selection: Option<Value>,
    auto_run: Option<bool>,
    status: JobStatus,
    results: Option<Value>,
    error: Option<JobFailure>,
    events: broadcast::Sender<JobEvent>,
}

impl JobModel {
    /// Create a pending job for `project_id` with no parameters.
    pub fn new(project_id: impl Into<Oid>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            id: JobIdentity::unassigned(project_id),
            oid: None,
            domains: Vec::new(),
            dimensions: Vec::new(),
            metrics: Vec::new(),
            selection: None,
            auto_run: None,
            status: JobStatus::Pending,
            results: None,
            error: None,
            events,
        }
    }

    /// Wrap the model in a shared handle for orchestration.
    pub fn into_shared(self) -> SharedJob {
        Arc::new(Mutex::new(self))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    // ---- accessors ----

    pub fn id(&self) -> &JobIdentity {
        &self.id
    }

    pub fn project_id(&self) -> &Oid {
        &self.id.project_id
    }

    /// Server-assigned job id, once submission succeeded.
    pub fn oid(&self) -> Option<&Oid> {
        self.oid.as_ref()
    }

    pub fn domains(&self) -> &[DomainRef] {
        &self.domains
    }

    pub fn dimensions(&self) -> &[DimensionRef] {
        &self.dimensions
    }

    pub fn metrics(&self) -> &[MetricRef] {
        &self.metrics
    }

    pub fn selection(&self) -> Option<&Value> {
        self.selection.as_ref()
    }

    pub fn auto_run(&self) -> Option<bool> {
        self.auto_run
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn results(&self) -> Option<&Value> {
        self.results.as_ref()
    }

    pub fn error(&self) -> Option<&JobFailure> {
        self.error.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }

    // ---- parameter setters ----

    /// Point the job at another project, dropping any assigned job id.
    pub fn set_project_id(&mut self, project_id: impl Into<Oid>) -> &mut Self {
        self.id = JobIdentity::unassigned(project_id);
        self.oid = None;
        self
    }

    pub fn set_domain_ids<I>(&mut self, domain_ids: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Oid>,
    {
        let project_id = self.id.project_id.clone();
        self.domains = domain_ids
            .into_iter()
            .map(|domain_id| DomainRef {
                project_id: project_id.clone(),
                domain_id: domain_id.into(),
            })
            .collect();
        self
    }

    /// Rebuild the dimension list, stamping project and first domain.
    ///
    /// Fails with [`CoreError::MissingDomain`] when no domain is set.
    pub fn set_dimension_ids<I>(&mut self, dimension_ids: I) -> Result<&mut Self, CoreError>
    where
        I: IntoIterator,
        I::Item: Into<Oid>,
    {
        let domain_id = self.first_domain_id("dimension")?;
        let project_id = self.id.project_id.clone();
        self.dimensions = dimension_ids
            .into_iter()
            .map(|dimension_id| DimensionRef {
                project_id: project_id.clone(),
                domain_id: domain_id.clone(),
                dimension_id: dimension_id.into(),
            })
            .collect();
        self.notify_dimensions();
        Ok(self)
    }

    /// Replace the dimension at `index`, or append when `index` equals
    /// the current length.
    pub fn set_dimension_id(
        &mut self,
        dimension_id: impl Into<Oid>,
        index: usize,
    ) -> Result<&mut Self, CoreError> {
        let domain_id = self.first_domain_id("dimension")?;
        let len = self.dimensions.len();
        if index > len {
            return Err(CoreError::IndexOutOfRange { index, len });
        }

        let dimension = DimensionRef {
            project_id: self.id.project_id.clone(),
            domain_id,
            dimension_id: dimension_id.into(),
        };
        if index == len {
            self.dimensions.push(dimension);
        } else {
            self.dimensions[index] = dimension;
        }
        self.notify_dimensions();
        Ok(self)
    }

    pub fn set_metric_ids<I>(&mut self, metric_ids: I) -> Result<&mut Self, CoreError>
    where
        I: IntoIterator,
        I::Item: Into<Oid>,
    {
        let domain_id = self.first_domain_id("metric")?;
        let project_id = self.id.project_id.clone();
        self.metrics = metric_ids
            .into_iter()
            .map(|metric_id| MetricRef {
                project_id: project_id.clone(),
                domain_id: domain_id.clone(),
                metric_id: metric_id.into(),
            })
            .collect();
        Ok(self)
    }

    pub fn set_selection(&mut self, selection: Option<Value>) -> &mut Self {
        self.selection = selection;
        self
    }

    pub fn set_auto_run(&mut self, auto_run: Option<bool>) -> &mut Self {
        self.auto_run = auto_run;
        self
    }

    // ---- lifecycle (driven by orchestrators) ----

    /// Move the status forward, emitting the matching events.
    pub fn advance(&mut self, to: JobStatus) -> Result<(), CoreError> {
        self.status.check_advance(to)?;
        self.status = to;
        let _ = self.events.send(JobEvent::StatusChanged {
            status: to,
            at: Utc::now(),
        });
        if to == JobStatus::Done {
            let _ = self.events.send(JobEvent::Settled {
                failed: self.error.is_some(),
            });
        }
        Ok(())
    }

    /// Record the identity the service assigned on submission.
    pub fn assign_identity(&mut self, id: JobIdentity) {
        self.oid = id.analysis_job_id.clone();
        self.id = id;
    }

    /// Settle successfully with `results`, clearing any previous error.
    pub fn settle_success(&mut self, results: Option<Value>) -> Result<(), CoreError> {
        self.status.check_advance(JobStatus::Done)?;
        self.error = None;
        self.results = results;
        self.advance(JobStatus::Done)
    }

    /// Settle with `error`; results are always cleared.
    pub fn settle_failure(&mut self, error: JobFailure) -> Result<(), CoreError> {
        self.status.check_advance(JobStatus::Done)?;
        self.results = None;
        self.error = Some(error);
        self.advance(JobStatus::Done)
    }

    /// Start a fresh lifecycle so a settled job can be computed again.
    ///
    /// Parameters are kept; the assigned job id and outcome are dropped.
    pub fn reset(&mut self) {
        self.id.analysis_job_id = None;
        self.oid = None;
        self.results = None;
        self.error = None;
        self.status = JobStatus::Pending;
        let _ = self.events.send(JobEvent::StatusChanged {
            status: JobStatus::Pending,
            at: Utc::now(),
        });
    }

    fn first_domain_id(&self, kind: &'static str) -> Result<Oid, CoreError> {
        self.domains
            .first()
            .map(|d| d.domain_id.clone())
            .ok_or(CoreError::MissingDomain(kind))
    }

    fn notify_dimensions(&self) {
        let _ = self
            .events
            .send(JobEvent::DimensionsChanged(self.dimensions.clone()));
    }
}

// ---------------------------------------------------------------------------
// BatchModel
// ---------------------------------------------------------------------------

/// A fixed set of jobs computed together.
///
/// `status` and `error` are derived by the batch orchestrator after all
/// children settle; children never write them.
#[derive(Debug)]
pub struct BatchModel {
    status: JobStatus,
    error: Option<JobFailure>,
    children: Vec<SharedJob>,
    events: broadcast::Sender<JobEvent>,
}

impl BatchModel {
    pub fn new(children: Vec<SharedJob>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            status: JobStatus::Pending,
            error: None,
            children,
            events,
        }
    }

    pub fn into_shared(self) -> SharedBatch {
        Arc::new(Mutex::new(self))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn children(&self) -> &[SharedJob] {
        &self.children
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn error(&self) -> Option<&JobFailure> {
        self.error.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }

    pub fn advance(&mut self, to: JobStatus) -> Result<(), CoreError> {
        self.status.check_advance(to)?;
        self.status = to;
        let _ = self.events.send(JobEvent::StatusChanged {
            status: to,
            at: Utc::now(),
        });
        if to == JobStatus::Done {
            let _ = self.events.send(JobEvent::Settled {
                failed: self.error.is_some(),
            });
        }
        Ok(())
    }

    /// Settle the batch with the aggregated child error, if any.
    pub fn settle(&mut self, error: Option<JobFailure>) -> Result<(), CoreError> {
        self.status.check_advance(JobStatus::Done)?;
        self.error = error;
        self.advance(JobStatus::Done)
    }

    /// Start a fresh lifecycle for the batch and every child, so the
    /// batch can be computed again. Refused while the batch is running.
    pub async fn reset(&mut self) -> Result<(), CoreError> {
        if self.status == JobStatus::Running {
            return Err(CoreError::InvalidTransition {
                from: JobStatus::Running,
                to: JobStatus::Pending,
            });
        }
        for child in &self.children {
            child.lock().await.reset();
        }
        self.error = None;
        self.status = JobStatus::Pending;
        let _ = self.events.send(JobEvent::StatusChanged {
            status: JobStatus::Pending,
            at: Utc::now(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// What a caller asks to compute: one job or a batch of jobs.
///
/// The variant is fixed when the value is built; dispatch never inspects
/// the model's contents.
#[derive(Debug, Clone)]
pub enum Job {
    Single(SharedJob),
    Batch(SharedBatch),
}

impl Job {
    pub fn single(model: JobModel) -> Self {
        Self::Single(model.into_shared())
    }

    pub fn batch(children: Vec<SharedJob>) -> Self {
        Self::Batch(BatchModel::new(children).into_shared())
    }
}

impl From<SharedJob> for Job {
    fn from(job: SharedJob) -> Self {
        Self::Single(job)
    }
}

impl From<SharedBatch> for Job {
    fn from(batch: SharedBatch) -> Self {
        Self::Batch(batch)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn job_with_domain() -> JobModel {
        let mut job = JobModel::new(1);
        job.set_domain_ids([10]);
        job
    }

    #[test]
    fn domain_ids_are_stamped_with_project() {
        let job = job_with_domain();
        assert_eq!(
            job.domains(),
            &[DomainRef {
                project_id: Oid::from(1),
                domain_id: Oid::from(10),
            }]
        );
    }

    #[test]
    fn set_dimension_ids_stamps_first_domain_and_notifies_once() {
        let mut job = job_with_domain();
        let mut rx = job.subscribe();

        job.set_dimension_ids([5, 6]).unwrap();

        let expected = vec![
            DimensionRef {
                project_id: Oid::from(1),
                domain_id: Oid::from(10),
                dimension_id: Oid::from(5),
            },
            DimensionRef {
                project_id: Oid::from(1),
                domain_id: Oid::from(10),
                dimension_id: Oid::from(6),
            },
        ];
        assert_eq!(job.dimensions(), expected.as_slice());
        assert_matches!(rx.try_recv(), Ok(JobEvent::DimensionsChanged(dims)) if dims == expected);
        assert!(rx.try_recv().is_err(), "exactly one notification expected");
    }

    #[test]
    fn dimensions_without_domain_fail_fast() {
        let mut job = JobModel::new(1);
        let mut rx = job.subscribe();
        assert_eq!(
            job.set_dimension_ids([5]).unwrap_err(),
            CoreError::MissingDomain("dimension")
        );
        assert!(job.dimensions().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn metrics_without_domain_fail_fast() {
        let mut job = JobModel::new(1);
        assert_eq!(
            job.set_metric_ids(["count"]).unwrap_err(),
            CoreError::MissingDomain("metric")
        );
    }

    #[test]
    fn set_metric_ids_stamps_first_domain() {
        let mut job = JobModel::new("p");
        job.set_domain_ids(["d1", "d2"]);
        job.set_metric_ids(["count"]).unwrap();
        assert_eq!(job.metrics()[0].domain_id, Oid::from("d1"));
        assert_eq!(job.metrics()[0].project_id, Oid::from("p"));
    }

    #[test]
    fn set_dimension_id_replaces_and_appends() {
        let mut job = job_with_domain();
        job.set_dimension_ids([5, 6]).unwrap();

        job.set_dimension_id(7, 1).unwrap();
        job.set_dimension_id(8, 2).unwrap();

        let ids: Vec<&str> = job
            .dimensions()
            .iter()
            .map(|d| d.dimension_id.as_str())
            .collect();
        assert_eq!(ids, vec!["5", "7", "8"]);
    }

    #[test]
    fn set_dimension_id_rejects_gap() {
        let mut job = job_with_domain();
        assert_eq!(
            job.set_dimension_id(7, 3).unwrap_err(),
            CoreError::IndexOutOfRange { index: 3, len: 0 }
        );
    }

    #[test]
    fn set_project_id_drops_assigned_identity() {
        let mut job = JobModel::new(1);
        job.assign_identity(JobIdentity {
            project_id: Oid::from(1),
            analysis_job_id: Some(Oid::from(42)),
        });
        assert_eq!(job.oid(), Some(&Oid::from(42)));

        job.set_project_id(2);
        assert_eq!(job.id(), &JobIdentity::unassigned(2));
        assert!(job.oid().is_none());
    }

    #[test]
    fn status_never_regresses() {
        let mut job = JobModel::new(1);
        job.advance(JobStatus::Running).unwrap();
        assert_matches!(
            job.advance(JobStatus::Pending),
            Err(CoreError::InvalidTransition { .. })
        );
        assert_matches!(
            job.advance(JobStatus::Running),
            Err(CoreError::InvalidTransition { .. })
        );
        assert_eq!(job.status(), JobStatus::Running);
    }

    #[test]
    fn settle_failure_clears_results_and_settles_once() {
        let mut job = JobModel::new(1);
        let mut rx = job.subscribe();
        job.advance(JobStatus::Running).unwrap();
        job.settle_failure(JobFailure::new("bad selection")).unwrap();

        assert!(job.is_done());
        assert!(job.results().is_none());
        assert_eq!(job.error().unwrap().message, "bad selection");
        assert!(job.settle_success(Some(json!(1))).is_err());
        assert!(job.results().is_none(), "a refused settle must not write");

        let mut settled = 0;
        while let Ok(event) = rx.try_recv() {
            if let JobEvent::Settled { failed } = event {
                assert!(failed);
                settled += 1;
            }
        }
        assert_eq!(settled, 1);
    }

    #[test]
    fn reset_starts_a_new_lifecycle() {
        let mut job = job_with_domain();
        job.advance(JobStatus::Running).unwrap();
        job.settle_success(Some(json!({"value": 7}))).unwrap();

        job.reset();
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(job.results().is_none());
        assert_eq!(job.domains().len(), 1);
        job.advance(JobStatus::Running).unwrap();
    }

    #[test]
    fn status_serializes_upper_case() {
        assert_eq!(serde_json::to_value(JobStatus::Done).unwrap(), json!("DONE"));
        let status: JobStatus = serde_json::from_value(json!("RUNNING")).unwrap();
        assert_eq!(status, JobStatus::Running);
    }

    #[test]
    fn failure_keeps_unknown_fields() {
        let failure: JobFailure =
            serde_json::from_value(json!({"message": "boom", "errorCode": 12})).unwrap();
        assert_eq!(failure.message, "boom");
        assert_eq!(failure.extra.get("errorCode"), Some(&json!(12)));
        assert!(JobFailure::timeout(3).is_timeout());
        assert!(JobFailure::cancelled().is_cancelled());
    }

    #[test]
    fn batch_settles_with_aggregated_error() {
        let mut batch = BatchModel::new(vec![JobModel::new(1).into_shared()]);
        batch.advance(JobStatus::Running).unwrap();
        batch.settle(Some(JobFailure::new("child failed"))).unwrap();
        assert!(batch.is_done());
        assert_eq!(batch.error().unwrap().message, "child failed");
        assert_eq!(batch.children().len(), 1);
    }

    #[tokio::test]
    async fn batch_reset_resets_children_and_notifies() {
        let child = JobModel::new(1).into_shared();
        {
            let mut child = child.lock().await;
            child.advance(JobStatus::Running).unwrap();
            child.settle_failure(JobFailure::new("child failed")).unwrap();
        }
        let mut batch = BatchModel::new(vec![child.clone()]);
        batch.advance(JobStatus::Running).unwrap();
        assert_matches!(
            batch.reset().await,
            Err(CoreError::InvalidTransition { .. })
        );
        batch.settle(Some(JobFailure::new("child failed"))).unwrap();

        let mut rx = batch.subscribe();
        batch.reset().await.unwrap();

        assert_eq!(batch.status(), JobStatus::Pending);
        assert!(batch.error().is_none());
        let child = child.lock().await;
        assert_eq!(child.status(), JobStatus::Pending);
        assert!(child.error().is_none());
        assert_matches!(
            rx.try_recv(),
            Ok(JobEvent::StatusChanged {
                status: JobStatus::Pending,
                ..
            })
        );
    }
}
