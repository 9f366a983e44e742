//! Core data model: projects, teams, and execution records

mod execution;

pub use execution::{Execution, ExecutionStatus, TeamExecution, TeamExecutionStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Project
// ============================================================================

/// Lifecycle status of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Running,
    PendingCheckpoint,
    Completed,
    Failed,
    Denied,
}

impl ProjectStatus {
    /// Whether an execution is currently in flight or paused for review.
    /// At most one execution may be active per project.
    pub fn is_active(&self) -> bool {
        matches!(self, ProjectStatus::Running | ProjectStatus::PendingCheckpoint)
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Draft => write!(f, "draft"),
            ProjectStatus::Running => write!(f, "running"),
            ProjectStatus::PendingCheckpoint => write!(f, "pending_checkpoint"),
            ProjectStatus::Completed => write!(f, "completed"),
            ProjectStatus::Failed => write!(f, "failed"),
            ProjectStatus::Denied => write!(f, "denied"),
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProjectStatus::Draft),
            "running" => Ok(ProjectStatus::Running),
            "pending_checkpoint" => Ok(ProjectStatus::PendingCheckpoint),
            "completed" => Ok(ProjectStatus::Completed),
            "failed" => Ok(ProjectStatus::Failed),
            "denied" => Ok(ProjectStatus::Denied),
            other => Err(crate::Error::Store(format!(
                "unknown project status: {other}"
            ))),
        }
    }
}

/// Top-level unit of work: an ordered list of teams
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Teams ordered by `execution_order`
    pub teams: Vec<Team>,
    pub status: ProjectStatus,
    /// Set while an execution is running or paused at a checkpoint
    pub current_execution_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Team
// ============================================================================

/// Ordered group of agents executed as one remote unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub project_id: String,
    pub name: String,
    /// Agent-type identifiers, in submission order
    pub agents: Vec<String>,
    /// Position within the project, dense and 1-based.
    /// Insert/delete/reorder renumber the remainder.
    pub execution_order: i64,
    /// Pause for human review after this team completes
    pub checkpoint_enabled: bool,
    pub created_at: DateTime<Utc>,
}
