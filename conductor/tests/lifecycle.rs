//! End-to-end lifecycle tests through the public API
//!
//! Exercises project/team management, a checkpointed run against a
//! scripted backend, and durability of the execution history across a
//! store reopen. No network; the backend is an in-process double.

use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::tempdir;

use conductor::backend::{ExecutionBackend, PollConfig, PollResponse, RemoteStatus, TeamRequest};
use conductor::checkpoint::CheckpointDecision;
use conductor::models::{ExecutionStatus, ProjectStatus};
use conductor::{Database, Error, ExecutionEngine, RunOutcome};

/// Completes every submission on the first poll, recording requests
struct InstantBackend {
    submits: Mutex<Vec<TeamRequest>>,
}

impl InstantBackend {
    fn new() -> Self {
        Self {
            submits: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ExecutionBackend for &InstantBackend {
    async fn submit(&self, request: &TeamRequest) -> conductor::Result<String> {
        let mut submits = self.submits.lock().unwrap();
        submits.push(request.clone());
        Ok(format!("run-{}", submits.len()))
    }

    async fn poll(&self, handle: &str) -> conductor::Result<PollResponse> {
        Ok(PollResponse {
            status: RemoteStatus::Completed,
            progress: None,
            outputs: Some(vec![format!("{handle} output")]),
            duration: Some(50),
            cost: Some(0.05),
            combined_output: Some(format!("{handle} combined")),
            error: None,
        })
    }
}

fn fast_poll() -> PollConfig {
    PollConfig {
        interval: std::time::Duration::from_millis(0),
        max_attempts: 120,
    }
}

#[tokio::test]
async fn test_full_project_lifecycle() {
    let dir = tempdir().unwrap();
    let db = Database::open_at(dir.path().join("conductor.db")).unwrap();

    let project = db.create_project("website", "marketing site").unwrap();
    db.add_team(&project.id, "Planning", &["architect".to_string()], true)
        .unwrap();
    db.add_team(
        &project.id,
        "Build",
        &["coder".to_string(), "tester".to_string()],
        false,
    )
    .unwrap();

    let backend = InstantBackend::new();
    let engine = ExecutionEngine::new(db.clone(), &backend).with_poll_config(fast_poll());

    // Pauses after Planning, the only checkpointed team
    let outcome = engine.run(&project.id).await.unwrap();
    let execution = match outcome {
        RunOutcome::Paused { execution, .. } => execution,
        other => panic!("expected a checkpoint pause, got {other:?}"),
    };
    assert_eq!(execution.status, ExecutionStatus::PendingCheckpoint);
    assert_eq!(execution.team_executions.len(), 1);

    // The project cannot be mutated while the run is open
    assert!(matches!(
        db.delete_project(&project.id),
        Err(Error::Conflict(_))
    ));
    assert!(matches!(
        db.add_team(&project.id, "Late", &["coder".to_string()], false),
        Err(Error::Conflict(_))
    ));

    let outcome = engine
        .resume(&project.id, &execution.id, CheckpointDecision::Approve)
        .await
        .unwrap();
    let execution = match outcome {
        RunOutcome::Completed { execution } => execution,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(execution.team_executions.len(), 2);
    assert_eq!(execution.total_duration_ms, 100);

    // Build saw Planning's output as context
    let submits = backend.submits.lock().unwrap();
    assert_eq!(submits.len(), 2);
    assert!(submits[0].previous_outputs.is_empty());
    assert_eq!(submits[1].previous_outputs.len(), 1);
    assert_eq!(submits[1].previous_outputs[0].team_name, "Planning");
    drop(submits);

    // History survives a store reopen
    drop(db);
    let db = Database::open_at(dir.path().join("conductor.db")).unwrap();
    let reloaded = db.get_project(&project.id).unwrap().unwrap();
    assert_eq!(reloaded.status, ProjectStatus::Completed);
    assert!(reloaded.current_execution_id.is_none());

    let history = db.list_executions(&project.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExecutionStatus::Completed);
    assert_eq!(history[0].team_executions.len(), 2);
}

#[tokio::test]
async fn test_denied_run_is_kept_and_project_editable_again() {
    let dir = tempdir().unwrap();
    let db = Database::open_at(dir.path().join("conductor.db")).unwrap();

    let project = db.create_project("api", "").unwrap();
    db.add_team(&project.id, "Design", &["architect".to_string()], true)
        .unwrap();
    db.add_team(&project.id, "Implement", &["coder".to_string()], false)
        .unwrap();

    let backend = InstantBackend::new();
    let engine = ExecutionEngine::new(db.clone(), &backend).with_poll_config(fast_poll());

    let outcome = engine.run(&project.id).await.unwrap();
    let execution = match outcome {
        RunOutcome::Paused { execution, .. } => execution,
        other => panic!("expected a checkpoint pause, got {other:?}"),
    };

    let outcome = engine
        .resume(&project.id, &execution.id, CheckpointDecision::Deny)
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Denied { .. }));

    // The run stays in history; the project is editable again
    let history = db.list_executions(&project.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExecutionStatus::Denied);
    db.add_team(&project.id, "Rework", &["coder".to_string()], false)
        .unwrap();

    // Implement never ran
    assert_eq!(backend.submits.lock().unwrap().len(), 1);
}
