//! JSON job descriptions and rendering of their outcome.
//!
//! A job file describes either one analysis or a batch:
//!
//! ```json
//! {"projectId": "p", "domainIds": ["d"], "metricIds": ["m"]}
//! {"defaultSelection": {...}, "analyses": [{...}, {...}]}
//! ```

use std::path::Path;

use analysis_core::{BatchModel, CoreError, Job, JobModel, Oid, SharedJob};
use serde::Deserialize;
use serde_json::{json, Value};

/// Top-level job file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFile {
    /// Selection used by analyses that carry none of their own.
    #[serde(default)]
    pub default_selection: Option<Value>,
    #[serde(flatten)]
    pub job: JobSpec,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum JobSpec {
    Batch { analyses: Vec<AnalysisSpec> },
    Single(AnalysisSpec),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSpec {
    pub project_id: Oid,
    #[serde(default)]
    pub domain_ids: Vec<Oid>,
    #[serde(default)]
    pub dimension_ids: Vec<Oid>,
    #[serde(default)]
    pub metric_ids: Vec<Oid>,
    #[serde(default)]
    pub selection: Option<Value>,
    #[serde(default)]
    pub auto_run: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum JobFileError {
    #[error("Failed to read job file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid job file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl AnalysisSpec {
    /// Build the job model. Dimensions and metrics need at least one
    /// domain; `default_domain` stands in when the analysis names none.
    pub fn to_model(&self, default_domain: Option<&Oid>) -> Result<JobModel, CoreError> {
        let mut model = JobModel::new(self.project_id.clone());
        match default_domain {
            Some(domain_id) if self.domain_ids.is_empty() => {
                model.set_domain_ids([domain_id.clone()]);
            }
            _ => {
                model.set_domain_ids(self.domain_ids.iter().cloned());
            }
        }
        if !self.dimension_ids.is_empty() {
            model.set_dimension_ids(self.dimension_ids.iter().cloned())?;
        }
        if !self.metric_ids.is_empty() {
            model.set_metric_ids(self.metric_ids.iter().cloned())?;
        }
        model
            .set_selection(self.selection.clone())
            .set_auto_run(self.auto_run);
        Ok(model)
    }
}

impl JobFile {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Build the job to compute. The variant follows the file's shape.
    pub fn to_job(&self, default_domain: Option<&Oid>) -> Result<Job, CoreError> {
        match &self.job {
            JobSpec::Single(spec) => Ok(Job::single(spec.to_model(default_domain)?)),
            JobSpec::Batch { analyses } => {
                let children = analyses
                    .iter()
                    .map(|spec| spec.to_model(default_domain).map(JobModel::into_shared))
                    .collect::<Result<Vec<SharedJob>, _>>()?;
                Ok(Job::Batch(BatchModel::new(children).into_shared()))
            }
        }
    }
}

pub fn load(path: &Path) -> Result<JobFile, JobFileError> {
    let text = std::fs::read_to_string(path)?;
    Ok(JobFile::parse(&text)?)
}

/// Render the current state of `job` as JSON.
pub async fn render(job: &Job) -> Value {
    match job {
        Job::Single(model) => render_model(model).await,
        Job::Batch(batch) => {
            let batch = batch.lock().await;
            let mut analyses = Vec::with_capacity(batch.children().len());
            for child in batch.children() {
                analyses.push(render_model(child).await);
            }
            json!({
                "status": batch.status(),
                "error": batch.error(),
                "analyses": analyses,
            })
        }
    }
}

async fn render_model(model: &SharedJob) -> Value {
    let model = model.lock().await;
    json!({
        "id": model.id(),
        "status": model.status(),
        "results": model.results(),
        "error": model.error(),
    })
}
