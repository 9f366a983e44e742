//! Remote execution backend boundary
//!
//! A team is submitted as one unit (agents may run concurrently on the
//! backend, opaque to us) and polled to completion on a fixed interval
//! with a bounded attempt count. Exceeding the bound is a first-class
//! timeout transition, not an incidental loop exit.

mod http;

pub use http::HttpBackend;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::PriorTeamOutput;
use crate::{Error, Result};

// ============================================================================
// Wire Types
// ============================================================================

/// Submission body for one team
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRequest {
    pub project_id: String,
    pub team_id: String,
    pub agents: Vec<String>,
    pub prompt: String,
    pub previous_outputs: Vec<PriorTeamOutput>,
}

/// Remote status of a submitted team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Running,
    Completed,
    Failed,
}

/// One poll response from the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub status: RemoteStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    /// Ordered per-agent outputs
    #[serde(default)]
    pub outputs: Option<Vec<String>>,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub combined_output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Terminal result of one successful team submission
#[derive(Debug, Clone)]
pub struct TeamOutcome {
    pub agent_outputs: Vec<String>,
    pub output: String,
    pub duration_ms: i64,
    pub cost: f64,
}

// ============================================================================
// Backend Trait
// ============================================================================

/// Seam to the remote execution service
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Submit a team for execution, returning an opaque handle to poll
    async fn submit(&self, request: &TeamRequest) -> Result<String>;

    /// Poll a submitted team's status once
    async fn poll(&self, handle: &str) -> Result<PollResponse>;
}

// ============================================================================
// Bounded Poller
// ============================================================================

/// Polling bounds: fixed interval, capped attempt count
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        // 1s * 120 attempts = 2 minute ceiling per team
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 120,
        }
    }
}

/// Poll a handle until the backend reports a terminal status.
///
/// Issues at most `max_attempts` polls; a still-running answer on the
/// final attempt yields `Error::Timeout`. Backend-reported failure and
/// transport failure both surface as errors, never retried here.
pub async fn poll_to_completion(
    backend: &dyn ExecutionBackend,
    handle: &str,
    config: &PollConfig,
) -> Result<TeamOutcome> {
    for attempt in 1..=config.max_attempts {
        let response = backend.poll(handle).await?;
        match response.status {
            RemoteStatus::Running => {
                tracing::trace!(
                    handle = %handle,
                    attempt = attempt,
                    progress = ?response.progress,
                    "Team still running"
                );
                if attempt < config.max_attempts {
                    tokio::time::sleep(config.interval).await;
                }
            }
            RemoteStatus::Completed => {
                let agent_outputs = response.outputs.unwrap_or_default();
                let output = response
                    .combined_output
                    .unwrap_or_else(|| agent_outputs.join("\n\n"));
                return Ok(TeamOutcome {
                    agent_outputs,
                    output,
                    duration_ms: response.duration.unwrap_or(0),
                    cost: response.cost.unwrap_or(0.0),
                });
            }
            RemoteStatus::Failed => {
                return Err(Error::Backend(
                    response
                        .error
                        .unwrap_or_else(|| "backend reported failure without detail".to_string()),
                ));
            }
        }
    }

    Err(Error::Timeout {
        attempts: config.max_attempts,
    })
}
