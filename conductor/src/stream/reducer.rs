//! Folds the status stream into a deduplicated execution timeline
//!
//! Agents are keyed by name. The reducer tolerates at-least-once
//! delivery: a duplicate `agent_start` updates the existing entry, and
//! an `agent_complete` with no matching start still records a completed
//! entry rather than being dropped.

use std::collections::HashMap;

use serde::Serialize;

use super::StreamEvent;

/// Display state of one agent on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Running,
    Complete,
}

/// One agent's row on the timeline, in order of first sighting
#[derive(Debug, Clone, Serialize)]
pub struct AgentEntry {
    pub agent: String,
    pub state: AgentState,
    pub output: Option<String>,
    /// Started as part of a `parallel_start` batch
    pub parallel: bool,
}

/// Client-side fold of the status stream
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionTimeline {
    pub entries: Vec<AgentEntry>,
    pub status_messages: Vec<String>,
    /// Delivered files, latest delivery wins per path
    pub files: HashMap<String, String>,
    pub completed: bool,
    pub completion_message: Option<String>,
    pub summary: Option<String>,
    /// Pipeline-extension events carried through untouched
    pub side_channel: Vec<StreamEvent>,
}

impl ExecutionTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the timeline
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Status { message } => {
                self.status_messages.push(message);
            }
            StreamEvent::AgentStart { agent } => {
                self.start_agent(&agent, false);
            }
            StreamEvent::ParallelStart { agents } => {
                for agent in agents {
                    self.start_agent(&agent, true);
                }
            }
            StreamEvent::AgentComplete { agent, output } => {
                match self.entries.iter().position(|e| e.agent == agent) {
                    Some(index) => {
                        let entry = &mut self.entries[index];
                        entry.state = AgentState::Complete;
                        entry.output = Some(output);
                    }
                    // lost agent_start: record the completion anyway
                    None => self.entries.push(AgentEntry {
                        agent,
                        state: AgentState::Complete,
                        output: Some(output),
                        parallel: false,
                    }),
                }
            }
            StreamEvent::Files { files } => {
                self.files.extend(files);
            }
            StreamEvent::Complete { message, summary } => {
                self.completed = true;
                self.completion_message = Some(message);
                self.summary = summary;
            }
            side_channel => {
                self.side_channel.push(side_channel);
            }
        }
    }

    /// Parse and fold one stream line. Malformed lines are logged and
    /// skipped so a single bad event never aborts the stream.
    pub fn apply_line(&mut self, line: &str) -> bool {
        if line.trim().is_empty() {
            return false;
        }
        match super::parse_line(line) {
            Ok(event) => {
                self.apply(event);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed status event");
                false
            }
        }
    }

    /// Number of agents currently running
    pub fn running(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == AgentState::Running)
            .count()
    }

    /// Idempotent start: an agent already on the timeline is updated in
    /// place, never duplicated.
    fn start_agent(&mut self, agent: &str, parallel: bool) {
        match self.entries.iter().position(|e| e.agent == agent) {
            Some(index) => {
                let entry = &mut self.entries[index];
                if entry.state == AgentState::Running {
                    entry.parallel = entry.parallel || parallel;
                }
                // a start after completion is stale; keep the completed entry
            }
            None => self.entries.push(AgentEntry {
                agent: agent.to_string(),
                state: AgentState::Running,
                output: None,
                parallel,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(agent: &str) -> StreamEvent {
        StreamEvent::AgentStart {
            agent: agent.to_string(),
        }
    }

    fn complete(agent: &str, output: &str) -> StreamEvent {
        StreamEvent::AgentComplete {
            agent: agent.to_string(),
            output: output.to_string(),
        }
    }

    #[test]
    fn test_duplicate_start_yields_single_entry() {
        let mut timeline = ExecutionTimeline::new();
        timeline.apply(start("A"));
        timeline.apply(start("A"));
        timeline.apply(complete("A", "done"));

        assert_eq!(timeline.entries.len(), 1);
        assert_eq!(timeline.entries[0].state, AgentState::Complete);
        assert_eq!(timeline.entries[0].output.as_deref(), Some("done"));
    }

    #[test]
    fn test_complete_without_start_is_recorded() {
        let mut timeline = ExecutionTimeline::new();
        timeline.apply(complete("B", "out"));

        assert_eq!(timeline.entries.len(), 1);
        assert_eq!(timeline.entries[0].agent, "B");
        assert_eq!(timeline.entries[0].state, AgentState::Complete);
    }

    #[test]
    fn test_parallel_start_marks_batch() {
        let mut timeline = ExecutionTimeline::new();
        timeline.apply(StreamEvent::ParallelStart {
            agents: vec!["coder".to_string(), "tester".to_string()],
        });

        assert_eq!(timeline.entries.len(), 2);
        assert!(timeline.entries.iter().all(|e| e.parallel));
        assert_eq!(timeline.running(), 2);
    }

    #[test]
    fn test_stale_start_after_complete_is_ignored() {
        let mut timeline = ExecutionTimeline::new();
        timeline.apply(start("A"));
        timeline.apply(complete("A", "done"));
        timeline.apply(start("A"));

        assert_eq!(timeline.entries.len(), 1);
        assert_eq!(timeline.entries[0].state, AgentState::Complete);
    }

    #[test]
    fn test_files_and_completion() {
        let mut timeline = ExecutionTimeline::new();
        timeline.apply(StreamEvent::Files {
            files: HashMap::from([("a.rs".to_string(), "v1".to_string())]),
        });
        timeline.apply(StreamEvent::Files {
            files: HashMap::from([("a.rs".to_string(), "v2".to_string())]),
        });
        timeline.apply(StreamEvent::Complete {
            message: "all done".to_string(),
            summary: Some("2 agents".to_string()),
        });

        assert_eq!(timeline.files.get("a.rs").unwrap(), "v2");
        assert!(timeline.completed);
        assert_eq!(timeline.summary.as_deref(), Some("2 agents"));
    }

    #[test]
    fn test_side_channel_events_bypass_timeline() {
        let mut timeline = ExecutionTimeline::new();
        timeline.apply(StreamEvent::ResearchProgress {
            message: "digging".to_string(),
        });
        timeline.apply(StreamEvent::ReportComplete {
            data: serde_json::json!({"report_html": "<html>", "report_type": "summary"}),
        });

        assert!(timeline.entries.is_empty());
        assert_eq!(timeline.side_channel.len(), 2);
    }

    #[test]
    fn test_malformed_line_skipped_stream_continues() {
        let mut timeline = ExecutionTimeline::new();
        assert!(timeline.apply_line(r#"{"type":"agent_start","agent":"A"}"#));
        assert!(!timeline.apply_line("garbage {{{"));
        assert!(timeline.apply_line(r#"{"type":"agent_complete","agent":"A","output":"ok"}"#));

        assert_eq!(timeline.entries.len(), 1);
        assert_eq!(timeline.entries[0].state, AgentState::Complete);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let mut timeline = ExecutionTimeline::new();
        assert!(!timeline.apply_line("   "));
        assert!(timeline.entries.is_empty());
    }
}
