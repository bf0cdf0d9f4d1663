#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use analysis_core::{JobIdentity, JobModel, SharedJob};
use analysis_jobs::{
    AnalysisService, ClientConfig, CreateJobRequest, JobController, PollConfig, ResultParams,
    ServiceError, StatusBoard,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

/// One scripted reply of the fake service.
pub enum Step {
    Reply(Value),
    Unavailable(&'static str),
    /// Wait for the notify, then reply.
    Gated(Arc<Notify>, Value),
    /// Never answer.
    Hang,
}

/// In-memory analysis service answering from per-job scripts.
///
/// Create replies are keyed by project id, fetch replies by analysis
/// job id, so concurrent batch children stay independent.
#[derive(Default)]
pub struct ScriptedService {
    creates: Mutex<HashMap<String, VecDeque<Step>>>,
    fetches: Mutex<HashMap<String, VecDeque<Step>>>,
    requests: Mutex<Vec<CreateJobRequest>>,
    fetch_params: Mutex<Vec<ResultParams>>,
    create_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl ScriptedService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_create(&self, project_id: &str, step: Step) -> &Self {
        self.creates
            .lock()
            .unwrap()
            .entry(project_id.to_string())
            .or_default()
            .push_back(step);
        self
    }

    pub fn on_fetch(&self, job_id: &str, step: Step) -> &Self {
        self.fetches
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push_back(step);
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CreateJobRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn fetch_params(&self) -> Vec<ResultParams> {
        self.fetch_params.lock().unwrap().clone()
    }

    async fn play(step: Option<Step>) -> Result<Value, ServiceError> {
        match step {
            Some(Step::Reply(body)) => Ok(body),
            Some(Step::Unavailable(msg)) => Err(ServiceError::Unavailable(msg.to_string())),
            Some(Step::Gated(gate, body)) => {
                gate.notified().await;
                Ok(body)
            }
            Some(Step::Hang) => std::future::pending::<Result<Value, ServiceError>>().await,
            None => Err(ServiceError::Unavailable("no scripted reply".into())),
        }
    }
}

#[async_trait]
impl AnalysisService for ScriptedService {
    async fn create(&self, request: &CreateJobRequest) -> Result<Value, ServiceError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let step = self
            .creates
            .lock()
            .unwrap()
            .get_mut(request.id.project_id.as_str())
            .and_then(VecDeque::pop_front);
        Self::play(step).await
    }

    async fn fetch(&self, id: &JobIdentity, params: &ResultParams) -> Result<Value, ServiceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_params.lock().unwrap().push(params.clone());
        let key = id
            .analysis_job_id
            .as_ref()
            .map(|oid| oid.to_string())
            .unwrap_or_default();
        let step = self
            .fetches
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        Self::play(step).await
    }
}

/// Config with an immediate, capped poll loop.
pub fn test_config() -> ClientConfig {
    ClientConfig::new("http://analysis.test").with_poll(PollConfig::immediate(10))
}

pub fn controller(service: Arc<ScriptedService>) -> JobController {
    controller_with(service, &test_config())
}

pub fn controller_with(service: Arc<ScriptedService>, config: &ClientConfig) -> JobController {
    JobController::new(service, config, Arc::new(StatusBoard::new()))
}

/// Create reply assigning `job_id` and leaving the job running.
pub fn running(project_id: &str, job_id: i64) -> Value {
    json!({
        "id": {"projectId": project_id, "analysisJobId": job_id},
        "status": "RUNNING",
    })
}

pub fn computing() -> Value {
    json!({"apiError": "COMPUTING_IN_PROGRESS"})
}

/// A job in `project_id` with one domain, dimension and metric.
pub fn job(project_id: &str) -> SharedJob {
    let mut model = JobModel::new(project_id);
    model.set_domain_ids(["sales"]);
    model.set_dimension_ids(["region"]).unwrap();
    model.set_metric_ids(["revenue"]).unwrap();
    model.into_shared()
}
