//! Live status stream for in-flight team executions
//!
//! While a team runs, the backend emits incremental events as
//! newline-delimited JSON objects discriminated by a `type` field. The
//! reducer folds them into a displayable timeline without ever blocking
//! the engine; a malformed event is logged and skipped, never fatal.

mod reducer;

pub use reducer::{AgentEntry, AgentState, ExecutionTimeline};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// Stream Events
// ============================================================================

/// One incremental status event from the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Free-form progress message
    Status { message: String },

    /// A single agent started
    AgentStart { agent: String },

    /// Several agents started concurrently
    ParallelStart { agents: Vec<String> },

    /// An agent finished with its output
    AgentComplete {
        agent: String,
        #[serde(default)]
        output: String,
    },

    /// Generated files delivered, keyed by path
    Files { files: HashMap<String, String> },

    /// The team execution finished
    Complete {
        message: String,
        #[serde(default)]
        summary: Option<String>,
    },

    /// Pipeline extension: the backend needs operator input.
    /// Opaque pass-through, payload shape owned by the backend.
    ClarificationRequired {
        session_id: String,
        data: serde_json::Value,
    },

    /// Pipeline extension: research progress note
    ResearchProgress { message: String },

    /// Pipeline extension: a report artifact is ready
    ReportComplete { data: serde_json::Value },
}

impl StreamEvent {
    /// Whether this event belongs to the side channel rather than the
    /// agent timeline
    pub fn is_side_channel(&self) -> bool {
        matches!(
            self,
            StreamEvent::ClarificationRequired { .. }
                | StreamEvent::ResearchProgress { .. }
                | StreamEvent::ReportComplete { .. }
        )
    }
}

/// Parse one stream line into an event
pub fn parse_line(line: &str) -> Result<StreamEvent> {
    serde_json::from_str(line.trim()).map_err(|e| Error::Parse(e.to_string()))
}
