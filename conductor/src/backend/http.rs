//! HTTP implementation of the execution backend
//!
//! `POST {base}/execute-team` submits a team; `GET {base}/status/{id}`
//! polls it. Transport failures and non-2xx answers surface as
//! `Error::Backend` and halt the state machine at a reproducible point.

use async_trait::async_trait;
use serde::Deserialize;

use super::{ExecutionBackend, PollResponse, TeamRequest};
use crate::{Error, Result};

/// HTTP client for the remote execution service
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a new backend client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// The base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    execution_id: String,
}

#[async_trait]
impl ExecutionBackend for HttpBackend {
    async fn submit(&self, request: &TeamRequest) -> Result<String> {
        let url = format!("{}/execute-team", self.base_url);
        tracing::debug!(url = %url, team_id = %request.team_id, "Submitting team");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("submit request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!(
                "submit rejected with {status}: {body}"
            )));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("malformed submit response: {e}")))?;
        Ok(body.execution_id)
    }

    async fn poll(&self, handle: &str) -> Result<PollResponse> {
        let url = format!("{}/status/{}", self.base_url, handle);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("status request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!(
                "status rejected with {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("malformed status response: {e}")))
    }
}
