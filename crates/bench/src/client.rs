//! HTTP client for the txflow server API.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Process exit code: run completed.
pub const EXIT_SUCCESS: i32 = 0;
/// Process exit code: run finished as FAILED or CANCELLED, or did not finish.
pub const EXIT_WORKFLOW_FAILED: i32 = 1;
/// Process exit code: request rejected before orchestration.
pub const EXIT_INVALID_INPUT: i32 = 2;
/// Process exit code: durable store (or the server) could not be reached.
pub const EXIT_STORE_UNAVAILABLE: i32 = 3;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with an error body.
    #[error("{status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),
}

impl ClientError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Api { status, .. } => match *status {
                StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => EXIT_INVALID_INPUT,
                StatusCode::SERVICE_UNAVAILABLE => EXIT_STORE_UNAVAILABLE,
                _ => EXIT_WORKFLOW_FAILED,
            },
            ClientError::Transport(_) => EXIT_STORE_UNAVAILABLE,
            ClientError::Argument(_) => EXIT_INVALID_INPUT,
        }
    }
}

/// A run as reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReply {
    pub run_id: String,
    #[serde(default)]
    pub workflow_name: Option<String>,
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "runtimeMs", default)]
    pub runtime_ms: Option<f64>,
}

impl RunReply {
    pub fn exit_code(&self) -> i32 {
        if self.status == "COMPLETED" {
            EXIT_SUCCESS
        } else {
            EXIT_WORKFLOW_FAILED
        }
    }
}

/// Reply from `/bare/{num}` (runtime in ms), `/txn/{num}` or `/wf/{num}` (runtime in ns).
#[derive(Debug, Clone, Deserialize)]
pub struct BenchReply {
    pub output: Value,
    pub runtime: f64,
}

#[derive(Debug, Serialize)]
struct TriggerBody<'a> {
    input: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Which benchmark endpoint to hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Endpoint {
    Bare,
    Txn,
    Wf,
}

impl Endpoint {
    fn path(&self) -> &'static str {
        match self {
            Endpoint::Bare => "bare",
            Endpoint::Txn => "txn",
            Endpoint::Wf => "wf",
        }
    }

    /// Convert the server-reported runtime to milliseconds.
    pub fn runtime_ms(&self, reply: &BenchReply) -> f64 {
        match self {
            Endpoint::Bare => reply.runtime,
            Endpoint::Txn | Endpoint::Wf => reply.runtime / 1_000_000.0,
        }
    }
}

pub struct TxflowClient {
    client: Client,
    base_url: String,
}

impl TxflowClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// POST /workflows/{name}/runs[/{run_id}]
    pub async fn trigger(
        &self,
        workflow: &str,
        run_id: Option<&str>,
        input: &Value,
        sync: bool,
        timeout: Option<Duration>,
    ) -> Result<RunReply, ClientError> {
        let mut url = match run_id {
            Some(id) => format!("{}/workflows/{}/runs/{}", self.base_url, workflow, id),
            None => format!("{}/workflows/{}/runs", self.base_url, workflow),
        };
        url.push_str(&format!("?sync={sync}"));
        if let Some(timeout) = timeout {
            url.push_str(&format!("&timeout_ms={}", timeout.as_millis()));
        }

        let response = self
            .client
            .post(&url)
            .json(&TriggerBody { input })
            .send()
            .await?;
        decode(response).await
    }

    /// GET /workflows/runs/{run_id}?wait_ms=
    pub async fn get_run(&self, run_id: &str, wait: Duration) -> Result<RunReply, ClientError> {
        let url = format!(
            "{}/workflows/runs/{}?wait_ms={}",
            self.base_url,
            run_id,
            wait.as_millis()
        );
        let response = self.client.get(&url).send().await?;
        decode(response).await
    }

    pub async fn bench(&self, endpoint: Endpoint, num: u64) -> Result<BenchReply, ClientError> {
        let url = format!("{}/{}/{}", self.base_url, endpoint.path(), num);
        let response = self.client.get(&url).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await?;
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ClientError::Api { status, message })
}
