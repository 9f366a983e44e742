//! Execution engine: drives a project run team by team
//!
//! Teams execute strictly sequentially because each team's input depends
//! on its predecessors' outputs. The engine is re-entrant across
//! checkpoint pauses: `run` starts a claimed execution and returns control
//! at the first checkpoint; `resume` applies the human decision and
//! re-enters the loop at the next team. Every state transition is
//! persisted before control returns to the caller.

use crate::backend::{poll_to_completion, ExecutionBackend, PollConfig, TeamRequest};
use crate::checkpoint::{review_output, CheckpointDecision, ReviewNote};
use crate::context::{build_context, render_prompt};
use crate::models::{Execution, ExecutionStatus, Project, Team};
use crate::store::Database;
use crate::{Error, Result};

/// What the caller gets back from `run`/`resume`
#[derive(Debug)]
pub enum RunOutcome {
    /// Every team completed
    Completed { execution: Execution },
    /// Paused at a checkpoint, awaiting a human decision
    Paused {
        execution: Execution,
        /// The team whose output awaits review
        team_id: String,
        /// Advisory metadata for the reviewer, never a gate
        review: ReviewNote,
    },
    /// The reviewer denied the run; it stays in history, unresumable
    Denied { execution: Execution },
}

/// Per-project run driver. Instances are independent; nothing global
/// serializes unrelated projects.
pub struct ExecutionEngine<B: ExecutionBackend> {
    store: Database,
    backend: B,
    poll: PollConfig,
}

impl<B: ExecutionBackend> ExecutionEngine<B> {
    /// Create an engine over the given store and backend
    pub fn new(store: Database, backend: B) -> Self {
        Self {
            store,
            backend,
            poll: PollConfig::default(),
        }
    }

    /// Override the polling bounds
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Start a new execution for the project.
    ///
    /// Fails with `Conflict` if one is already running or paused, and with
    /// `InvalidState` if the project has no teams. Both guards live inside
    /// the claim transaction, so the team list the run sees is the one the
    /// claim validated.
    pub async fn run(&self, project_id: &str) -> Result<RunOutcome> {
        let execution = self.store.claim_run(project_id)?;
        let project = self
            .store
            .get_project(project_id)?
            .ok_or_else(|| Error::NotFound(format!("project {project_id}")))?;
        tracing::info!(
            project_id = %project_id,
            execution_id = %execution.id,
            teams = project.teams.len(),
            "Starting run"
        );

        self.advance(&project, execution).await
    }

    /// Apply a checkpoint decision to a paused execution and re-enter the
    /// loop at the team after the pause.
    pub async fn resume(
        &self,
        project_id: &str,
        execution_id: &str,
        decision: CheckpointDecision,
    ) -> Result<RunOutcome> {
        let project = self
            .store
            .get_project(project_id)?
            .ok_or_else(|| Error::NotFound(format!("project {project_id}")))?;
        let execution = self
            .store
            .get_execution(execution_id)?
            .ok_or_else(|| Error::NotFound(format!("execution {execution_id}")))?;

        if execution.project_id != project.id {
            return Err(Error::NotFound(format!(
                "execution {execution_id} does not belong to project {project_id}"
            )));
        }
        if execution.status != ExecutionStatus::PendingCheckpoint {
            return Err(Error::InvalidState(format!(
                "execution {execution_id} is {}, not pending_checkpoint",
                execution.status
            )));
        }
        let pending_team_id = execution.pending_team_id.clone().ok_or_else(|| {
            Error::InvalidState(format!(
                "execution {execution_id} is paused without a pending team"
            ))
        })?;

        tracing::info!(
            execution_id = %execution_id,
            team_id = %pending_team_id,
            decision = ?decision_name(&decision),
            "Applying checkpoint decision"
        );

        match decision {
            CheckpointDecision::Deny => {
                self.store
                    .finalize_execution(execution_id, ExecutionStatus::Denied)?;
                let execution = self.load_execution(execution_id)?;
                return Ok(RunOutcome::Denied { execution });
            }
            CheckpointDecision::Edit(text) => {
                let paused = execution
                    .team_executions
                    .iter()
                    .rev()
                    .find(|te| te.team_id == pending_team_id)
                    .ok_or_else(|| {
                        Error::InvalidState(format!(
                            "no team execution recorded for pending team {pending_team_id}"
                        ))
                    })?;
                self.store.apply_edit(&paused.id, &text)?;
            }
            CheckpointDecision::Approve | CheckpointDecision::Skip => {}
        }

        self.store.resume_running(execution_id)?;
        let execution = self.load_execution(execution_id)?;
        self.advance(&project, execution).await
    }

    /// Drive the loop until a pause, a terminal failure, or completion.
    /// Teams already attempted in this execution are skipped.
    async fn advance(&self, project: &Project, mut execution: Execution) -> Result<RunOutcome> {
        let mut teams: Vec<&Team> = project.teams.iter().collect();
        teams.sort_by_key(|team| team.execution_order);

        for team in teams {
            let attempted = execution
                .team_executions
                .iter()
                .any(|te| te.team_id == team.id);
            if attempted {
                continue;
            }

            execution = self.execute_team(project, team, &execution).await?;

            if execution.status == ExecutionStatus::PendingCheckpoint {
                let review = execution
                    .team_executions
                    .iter()
                    .rev()
                    .find(|te| te.team_id == team.id)
                    .map(|te| review_output(&te.output))
                    .unwrap_or_default();
                return Ok(RunOutcome::Paused {
                    execution,
                    team_id: team.id.clone(),
                    review,
                });
            }
        }

        self.store
            .finalize_execution(&execution.id, ExecutionStatus::Completed)?;
        let execution = self.load_execution(&execution.id)?;
        tracing::info!(
            execution_id = %execution.id,
            total_cost = execution.total_cost,
            total_duration_ms = execution.total_duration_ms,
            "Run completed"
        );
        Ok(RunOutcome::Completed { execution })
    }

    /// Submit one team, poll it to a terminal state, and persist the
    /// outcome. Failures and timeouts finalize the whole run as failed
    /// before propagating; they are never retried.
    async fn execute_team(
        &self,
        project: &Project,
        team: &Team,
        execution: &Execution,
    ) -> Result<Execution> {
        let prior = build_context(&project.teams, &execution.team_executions);
        let request = TeamRequest {
            project_id: project.id.clone(),
            team_id: team.id.clone(),
            agents: team.agents.clone(),
            prompt: render_prompt(project, team, &prior),
            previous_outputs: prior,
        };

        let record = self.store.start_team_execution(&execution.id, &team.id)?;
        tracing::info!(
            execution_id = %execution.id,
            team_id = %team.id,
            team = %team.name,
            agents = team.agents.len(),
            "Executing team"
        );

        let handle = match self.backend.submit(&request).await {
            Ok(handle) => handle,
            Err(err) => {
                self.fail_run(&record.id, &execution.id, &err)?;
                return Err(err);
            }
        };

        match poll_to_completion(&self.backend, &handle, &self.poll).await {
            Ok(outcome) => {
                self.store.complete_team_execution(
                    &record.id,
                    &outcome.agent_outputs,
                    &outcome.output,
                    outcome.duration_ms,
                    outcome.cost,
                )?;
                if team.checkpoint_enabled {
                    self.store.set_pending_checkpoint(&execution.id, &team.id)?;
                }
                self.load_execution(&execution.id)
            }
            Err(err) => {
                self.fail_run(&record.id, &execution.id, &err)?;
                Err(err)
            }
        }
    }

    fn fail_run(&self, team_execution_id: &str, execution_id: &str, err: &Error) -> Result<()> {
        tracing::warn!(
            execution_id = %execution_id,
            error = %err,
            "Team failed, finalizing run as failed"
        );
        self.store
            .fail_team_execution(team_execution_id, &err.to_string())?;
        self.store
            .finalize_execution(execution_id, ExecutionStatus::Failed)?;
        Ok(())
    }

    fn load_execution(&self, execution_id: &str) -> Result<Execution> {
        self.store
            .get_execution(execution_id)?
            .ok_or_else(|| Error::NotFound(format!("execution {execution_id}")))
    }
}

fn decision_name(decision: &CheckpointDecision) -> &'static str {
    match decision {
        CheckpointDecision::Approve => "approve",
        CheckpointDecision::Deny => "deny",
        CheckpointDecision::Edit(_) => "edit",
        CheckpointDecision::Skip => "skip",
    }
}
