//! Execution records: one end-to-end run of a project and the per-team
//! attempts inside it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Execution
// ============================================================================

/// Status of one project run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    PendingCheckpoint,
    Completed,
    Failed,
    Denied,
}

impl ExecutionStatus {
    /// Terminal executions are immutable
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Denied
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::PendingCheckpoint => write!(f, "pending_checkpoint"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Denied => write!(f, "denied"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "pending_checkpoint" => Ok(ExecutionStatus::PendingCheckpoint),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "denied" => Ok(ExecutionStatus::Denied),
            other => Err(crate::Error::Store(format!(
                "unknown execution status: {other}"
            ))),
        }
    }
}

/// One end-to-end run of a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub project_id: String,
    pub status: ExecutionStatus,
    /// Append-only, one record per team attempted in this run
    pub team_executions: Vec<TeamExecution>,
    /// The team awaiting a human decision while paused
    pub pending_team_id: Option<String>,
    /// Sum of cost over completed team executions
    pub total_cost: f64,
    /// Sum of duration over completed team executions
    pub total_duration_ms: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// TeamExecution
// ============================================================================

/// Status of one team's attempt within an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TeamExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamExecutionStatus::Running => write!(f, "running"),
            TeamExecutionStatus::Completed => write!(f, "completed"),
            TeamExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TeamExecutionStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(TeamExecutionStatus::Running),
            "completed" => Ok(TeamExecutionStatus::Completed),
            "failed" => Ok(TeamExecutionStatus::Failed),
            other => Err(crate::Error::Store(format!(
                "unknown team execution status: {other}"
            ))),
        }
    }
}

/// Record of one team's attempt within an execution.
/// Immutable once terminal, except that `output` may be replaced exactly
/// once by a checkpoint edit before the run continues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamExecution {
    pub id: String,
    pub execution_id: String,
    pub team_id: String,
    pub status: TeamExecutionStatus,
    /// Ordered, one per agent submitted
    pub agent_outputs: Vec<String>,
    /// Combined output consumed by later teams
    pub output: String,
    pub duration_ms: i64,
    pub cost: f64,
    /// True if a human overwrote `output` at a checkpoint
    pub edited: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_execution_status_round_trip() {
        for status in [
            ExecutionStatus::Running,
            ExecutionStatus::PendingCheckpoint,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Denied,
        ] {
            let parsed = ExecutionStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::PendingCheckpoint.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Denied.is_terminal());
    }

    #[test]
    fn test_team_execution_status_round_trip() {
        for status in [
            TeamExecutionStatus::Running,
            TeamExecutionStatus::Completed,
            TeamExecutionStatus::Failed,
        ] {
            let parsed = TeamExecutionStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
    }
}
