//! Checkpoint handling for human-in-loop approval
//!
//! A paused execution accepts exactly one decision. Approve and skip are
//! equivalent; edit replaces the just-completed team's output before the
//! run continues; deny terminates the run. The advisory review attached
//! to a pause is metadata for the human, never a gate.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Human decision applied to a paused execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointDecision {
    /// Resume unchanged
    Approve,
    /// Terminate the run; it cannot be resumed afterwards
    Deny,
    /// Replace the paused team's output with this text, then resume
    Edit(String),
    /// Same as approve
    Skip,
}

impl CheckpointDecision {
    /// Parse a CLI decision word, pairing `edit` with its supplied text
    pub fn parse(decision: &str, edited_output: Option<String>) -> Result<Self, Error> {
        match decision {
            "approve" => Ok(CheckpointDecision::Approve),
            "deny" => Ok(CheckpointDecision::Deny),
            "skip" => Ok(CheckpointDecision::Skip),
            "edit" => match edited_output {
                Some(text) => Ok(CheckpointDecision::Edit(text)),
                None => Err(Error::InvalidState(
                    "edit decision requires the replacement output".to_string(),
                )),
            },
            other => Err(Error::InvalidState(format!(
                "unknown checkpoint decision: {other}"
            ))),
        }
    }
}

// ============================================================================
// Advisory Review
// ============================================================================

/// Non-authoritative note attached to a paused run for the reviewer.
/// Heuristics only; the controller never judges output itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewNote {
    /// Things worth a second look, empty when nothing stood out
    pub flags: Vec<String>,
    pub summary: String,
}

/// Keywords that tend to show up when a team ran into trouble
const SUSPECT_KEYWORDS: &[&str] = &["error", "failed", "unable to", "todo"];

/// Minimum output length below which the note flags brevity
const SHORT_OUTPUT_CHARS: usize = 80;

/// Produce the advisory note for a team output
pub fn review_output(output: &str) -> ReviewNote {
    let mut flags = Vec::new();

    let trimmed = output.trim();
    if trimmed.is_empty() {
        flags.push("output is empty".to_string());
    } else if trimmed.len() < SHORT_OUTPUT_CHARS {
        flags.push(format!("output is short ({} chars)", trimmed.len()));
    }

    let lowered = trimmed.to_lowercase();
    for keyword in SUSPECT_KEYWORDS {
        if lowered.contains(keyword) {
            flags.push(format!("output mentions \"{keyword}\""));
        }
    }

    let summary = if flags.is_empty() {
        "nothing flagged".to_string()
    } else {
        format!("{} item(s) flagged for review", flags.len())
    };

    ReviewNote { flags, summary }
}
