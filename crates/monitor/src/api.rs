//! REST client for the workflow execution endpoints.
//!
//! Wraps snapshot reads, execution creation, control commands and the
//! stream endpoint using [`reqwest`]. Every request carries the bearer
//! token from the configured [`CredentialSource`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};

use cadence_core::command::ExecutionCommand;
use cadence_core::snapshot::ExecutionSnapshot;
use cadence_core::types::ExecutionId;

use crate::auth::{CredentialSource, NoCredentials, StaticToken};
use crate::backend::{CreateExecutionRequest, CreatedExecution, EventStream, ExecutionBackend};
use crate::config::MonitorConfig;
use crate::stream;

/// HTTP client for one workflow API deployment.
#[derive(Clone)]
pub struct WorkflowApi {
    client: reqwest::Client,
    api_url: String,
    credentials: Arc<dyn CredentialSource>,
}

/// Errors from the workflow REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("Workflow API error ({status}): {detail}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Human-readable detail extracted from the error body.
        detail: String,
    },

    /// A 2xx body did not have the expected shape.
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status of a rejected request, if the engine answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) => None,
        }
    }

    /// `true` when the request was refused for missing or expired
    /// credentials.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl WorkflowApi {
    /// Create a client for the API rooted at `api_url`
    /// (e.g. `http://host:8000/api/v1`).
    pub fn new(api_url: impl Into<String>, credentials: Arc<dyn CredentialSource>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, credentials)
    }

    /// Create a client reusing an existing [`reqwest::Client`] (shares its
    /// connection pool).
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            credentials,
        }
    }

    /// Build a client from [`MonitorConfig`], using its static token if set.
    pub fn from_config(config: &MonitorConfig) -> Self {
        let credentials: Arc<dyn CredentialSource> = match &config.api_token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(NoCredentials),
        };
        Self::new(config.api_url.clone(), credentials)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Fetch the current snapshot of an execution.
    ///
    /// Sends `GET /workflows/executions/{id}`.
    pub async fn get_execution(&self, id: &ExecutionId) -> Result<ExecutionSnapshot, ApiError> {
        let response = self
            .authorize(self.client.get(self.execution_url(id)))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Create a new execution.
    ///
    /// Sends `POST /workflows/executions` with template, project and inputs.
    /// Returns the server-assigned id.
    pub async fn create_execution(
        &self,
        request: &CreateExecutionRequest,
    ) -> Result<CreatedExecution, ApiError> {
        let response = self
            .authorize(
                self.client
                    .post(format!("{}/workflows/executions", self.api_url)),
            )
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Issue a control command.
    ///
    /// Sends `POST /workflows/executions/{id}/{pause|resume|stop}`.
    pub async fn send_command(
        &self,
        id: &ExecutionId,
        command: ExecutionCommand,
    ) -> Result<(), ApiError> {
        let response = self
            .authorize(
                self.client
                    .post(format!("{}/{}", self.execution_url(id), command.action())),
            )
            .send()
            .await?;

        Self::check_status(response).await
    }

    pub async fn pause(&self, id: &ExecutionId) -> Result<(), ApiError> {
        self.send_command(id, ExecutionCommand::Pause).await
    }

    pub async fn resume(&self, id: &ExecutionId) -> Result<(), ApiError> {
        self.send_command(id, ExecutionCommand::Resume).await
    }

    pub async fn stop(&self, id: &ExecutionId) -> Result<(), ApiError> {
        self.send_command(id, ExecutionCommand::Stop).await
    }

    /// Open the server-sent-events stream of an execution.
    ///
    /// Sends `GET /workflows/executions/{id}/stream` and returns the decoded
    /// frames once the engine answers with a success status.
    pub async fn open_stream(&self, id: &ExecutionId) -> Result<EventStream, ApiError> {
        let response = self
            .authorize(self.client.get(format!("{}/stream", self.execution_url(id))))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(stream::sse_frames(response))
    }

    // ---- private helpers ----

    fn execution_url(&self, id: &ExecutionId) -> String {
        format!("{}/workflows/executions/{}", self.api_url, id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.bearer_token() {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Api`] carrying the
    /// status and the body's detail message on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "<unreadable body>".to_string());
            return Err(ApiError::Api {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionBackend for WorkflowApi {
    async fn fetch_execution(&self, id: &ExecutionId) -> Result<ExecutionSnapshot, ApiError> {
        self.get_execution(id).await
    }

    async fn create_execution(
        &self,
        request: &CreateExecutionRequest,
    ) -> Result<CreatedExecution, ApiError> {
        WorkflowApi::create_execution(self, request).await
    }

    async fn send_command(
        &self,
        id: &ExecutionId,
        command: ExecutionCommand,
    ) -> Result<(), ApiError> {
        WorkflowApi::send_command(self, id, command).await
    }

    async fn open_stream(&self, id: &ExecutionId) -> Result<EventStream, ApiError> {
        WorkflowApi::open_stream(self, id).await
    }
}

/// Extract a human-readable message from an error body.
///
/// Looks for a string `detail`, `message` or `error` field in a JSON
/// object; falls back to the trimmed raw body. `None` for empty bodies.
fn error_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(body) {
        for key in ["detail", "message", "error"] {
            match fields.get(key) {
                Some(serde_json::Value::String(text)) => return Some(text.clone()),
                Some(serde_json::Value::Null) | None => {}
                Some(other) => return Some(other.to_string()),
            }
        }
    }

    Some(body.to_string())
}
