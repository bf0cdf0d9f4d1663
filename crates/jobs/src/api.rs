//! REST client for the analysis service HTTP endpoints.
//!
//! Wraps job creation and result retrieval using [`reqwest`].

use std::time::Duration;

use analysis_core::{JobIdentity, Oid};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::service::{AnalysisService, CreateJobRequest, ResultParams, ServiceError};

/// HTTP client for one analysis service deployment.
pub struct HttpAnalysisService {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl HttpAnalysisService {
    /// Create a client for the service at `api_url`
    /// (e.g. `https://api.example.com/v4.2/rs`).
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Build a client from configuration, applying the request timeout
    /// and bearer token.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let service = Self::with_client(client, config.api_url.clone());
        Ok(match &config.api_token {
            Some(token) => service.with_token(token.clone()),
            None => service,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn jobs_url(&self, project_id: &Oid) -> String {
        format!("{}/projects/{}/analysisjobs", self.api_url, project_id)
    }

    fn results_url(&self, project_id: &Oid, job_id: &Oid, params: &ResultParams) -> String {
        format!(
            "{}/{}/results?compression={}&format={}",
            self.jobs_url(project_id),
            job_id,
            params.compression,
            params.format,
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, otherwise return
    /// [`ServiceError::Api`] with the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response(response: reqwest::Response) -> Result<Value, ServiceError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    /// `POST /projects/{projectId}/analysisjobs`
    async fn create(&self, request: &CreateJobRequest) -> Result<Value, ServiceError> {
        let url = self.jobs_url(&request.id.project_id);
        tracing::debug!(url = %url, "Creating analysis job");

        let response = self
            .authorize(self.client.post(url))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /projects/{projectId}/analysisjobs/{analysisJobId}/results`
    async fn fetch(&self, id: &JobIdentity, params: &ResultParams) -> Result<Value, ServiceError> {
        let job_id = id.analysis_job_id.as_ref().ok_or_else(|| {
            ServiceError::Unavailable("cannot fetch results of an unsubmitted job".into())
        })?;
        let url = self.results_url(&id.project_id, job_id, params);
        tracing::debug!(url = %url, "Fetching analysis job results");

        let response = self.authorize(self.client.get(url)).send().await?;

        Self::parse_response(response).await
    }
}
