//! Execution lifecycle persistence
//!
//! Every engine state transition lands here before control returns to the
//! caller: claiming a run, appending team attempts, pausing at a
//! checkpoint, resuming, and finalizing. A crash between transitions
//! leaves the project in a durable `pending_checkpoint` or terminal state.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::Database;
use crate::models::{
    Execution, ExecutionStatus, ProjectStatus, TeamExecution, TeamExecutionStatus,
};
use crate::{Error, Result};

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const EXECUTION_COLUMNS: &str =
    "id, project_id, status, pending_team_id, total_cost, total_duration_ms, started_at, completed_at";

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<Execution> {
    let status: String = row.get(2)?;
    let started_at: String = row.get(6)?;
    let completed_at: Option<String> = row.get(7)?;
    Ok(Execution {
        id: row.get(0)?,
        project_id: row.get(1)?,
        status: status.parse().unwrap_or(ExecutionStatus::Running),
        team_executions: Vec::new(),
        pending_team_id: row.get(3)?,
        total_cost: row.get(4)?,
        total_duration_ms: row.get(5)?,
        started_at: parse_ts(&started_at),
        completed_at: completed_at.as_deref().map(parse_ts),
    })
}

const TEAM_EXECUTION_COLUMNS: &str = "id, execution_id, team_id, status, agent_outputs, output, \
     duration_ms, cost, edited, error, started_at, completed_at";

fn team_execution_from_row(row: &Row<'_>) -> rusqlite::Result<TeamExecution> {
    let status: String = row.get(3)?;
    let agent_outputs: String = row.get(4)?;
    let started_at: String = row.get(10)?;
    let completed_at: Option<String> = row.get(11)?;
    Ok(TeamExecution {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        team_id: row.get(2)?,
        status: status.parse().unwrap_or(TeamExecutionStatus::Running),
        agent_outputs: serde_json::from_str(&agent_outputs).unwrap_or_default(),
        output: row.get(5)?,
        duration_ms: row.get(6)?,
        cost: row.get(7)?,
        edited: row.get::<_, i64>(8)? != 0,
        error: row.get(9)?,
        started_at: parse_ts(&started_at),
        completed_at: completed_at.as_deref().map(parse_ts),
    })
}

fn load_team_executions(conn: &Connection, execution_id: &str) -> Result<Vec<TeamExecution>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TEAM_EXECUTION_COLUMNS} FROM team_executions
         WHERE execution_id = ?1 ORDER BY started_at, rowid"
    ))?;
    let records = stmt
        .query_map([execution_id], team_execution_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

impl Database {
    // ------------------------------------------------------------------------
    // Run lifecycle
    // ------------------------------------------------------------------------

    /// Atomically claim the right to run a project: checks the project
    /// status and team count, then transitions to `running`, all in one
    /// transaction. This is the sole concurrency guard against concurrent
    /// `run` calls and against team mutations racing the claim.
    pub fn claim_run(&self, project_id: &str) -> Result<Execution> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(Error::from)?;

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM projects WHERE id = ?1",
                [project_id],
                |row| row.get(0),
            )
            .optional()?;
        let status: ProjectStatus = status
            .ok_or_else(|| Error::NotFound(format!("project {project_id}")))?
            .parse()?;

        if status.is_active() {
            return Err(Error::Conflict(format!(
                "project {project_id} already has an active execution ({status})"
            )));
        }

        let team_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM teams WHERE project_id = ?1",
            [project_id],
            |row| row.get(0),
        )?;
        if team_count == 0 {
            return Err(Error::InvalidState(format!(
                "project {project_id} has no teams to run"
            )));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        tx.execute(
            r#"
            INSERT INTO executions (id, project_id, status, started_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            (
                &id,
                project_id,
                ExecutionStatus::Running.to_string(),
                now.to_rfc3339(),
            ),
        )?;
        tx.execute(
            r#"
            UPDATE projects SET status = ?1, current_execution_id = ?2, updated_at = ?3
            WHERE id = ?4
            "#,
            (
                ProjectStatus::Running.to_string(),
                &id,
                now.to_rfc3339(),
                project_id,
            ),
        )?;
        tx.commit()?;

        tracing::info!(project_id = %project_id, execution_id = %id, "Claimed run");
        Ok(Execution {
            id,
            project_id: project_id.to_string(),
            status: ExecutionStatus::Running,
            team_executions: Vec::new(),
            pending_team_id: None,
            total_cost: 0.0,
            total_duration_ms: 0,
            started_at: now,
            completed_at: None,
        })
    }

    /// Get an execution with its team executions in attempt order
    pub fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        let conn = self.conn.lock().unwrap();
        let execution = conn
            .query_row(
                &format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?1"),
                [id],
                execution_from_row,
            )
            .optional()?;

        match execution {
            Some(mut execution) => {
                execution.team_executions = load_team_executions(&conn, id)?;
                Ok(Some(execution))
            }
            None => Ok(None),
        }
    }

    /// List a project's run history, oldest first
    pub fn list_executions(&self, project_id: &str) -> Result<Vec<Execution>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM executions
             WHERE project_id = ?1 ORDER BY started_at, rowid"
        ))?;
        let mut executions = stmt
            .query_map([project_id], execution_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for execution in &mut executions {
            execution.team_executions = load_team_executions(&conn, &execution.id)?;
        }
        Ok(executions)
    }

    // ------------------------------------------------------------------------
    // Team executions
    // ------------------------------------------------------------------------

    /// Append a running team-execution record
    pub fn start_team_execution(&self, execution_id: &str, team_id: &str) -> Result<TeamExecution> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO team_executions (id, execution_id, team_id, status, started_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            (
                &id,
                execution_id,
                team_id,
                TeamExecutionStatus::Running.to_string(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(TeamExecution {
            id,
            execution_id: execution_id.to_string(),
            team_id: team_id.to_string(),
            status: TeamExecutionStatus::Running,
            agent_outputs: Vec::new(),
            output: String::new(),
            duration_ms: 0,
            cost: 0.0,
            edited: false,
            error: None,
            started_at: now,
            completed_at: None,
        })
    }

    /// Mark a team execution completed with its outputs and metrics
    pub fn complete_team_execution(
        &self,
        id: &str,
        agent_outputs: &[String],
        output: &str,
        duration_ms: i64,
        cost: f64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE team_executions
            SET status = ?1, agent_outputs = ?2, output = ?3, duration_ms = ?4,
                cost = ?5, completed_at = ?6
            WHERE id = ?7
            "#,
            (
                TeamExecutionStatus::Completed.to_string(),
                serde_json::to_string(agent_outputs)?,
                output,
                duration_ms,
                cost,
                Utc::now().to_rfc3339(),
                id,
            ),
        )?;
        Ok(())
    }

    /// Mark a team execution failed with an error message
    pub fn fail_team_execution(&self, id: &str, error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE team_executions
            SET status = ?1, error = ?2, completed_at = ?3
            WHERE id = ?4
            "#,
            (
                TeamExecutionStatus::Failed.to_string(),
                error,
                Utc::now().to_rfc3339(),
                id,
            ),
        )?;
        Ok(())
    }

    /// Overwrite a completed team execution's output with human-edited
    /// text. Permitted exactly once per record.
    pub fn apply_edit(&self, team_execution_id: &str, text: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT status, edited FROM team_executions WHERE id = ?1",
                [team_execution_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (status, edited) =
            row.ok_or_else(|| Error::NotFound(format!("team execution {team_execution_id}")))?;

        if status.parse::<TeamExecutionStatus>()? != TeamExecutionStatus::Completed {
            return Err(Error::InvalidState(format!(
                "team execution {team_execution_id} is {status}, only completed output can be edited"
            )));
        }
        if edited != 0 {
            return Err(Error::InvalidState(format!(
                "team execution {team_execution_id} output was already edited"
            )));
        }

        conn.execute(
            "UPDATE team_executions SET output = ?1, edited = 1 WHERE id = ?2",
            (text, team_execution_id),
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Checkpoint transitions
    // ------------------------------------------------------------------------

    /// Pause the execution at a checkpoint after the given team
    pub fn set_pending_checkpoint(&self, execution_id: &str, team_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let project_id = require_execution_open(&conn, execution_id)?;

        conn.execute(
            "UPDATE executions SET status = ?1, pending_team_id = ?2 WHERE id = ?3",
            (
                ExecutionStatus::PendingCheckpoint.to_string(),
                team_id,
                execution_id,
            ),
        )?;
        conn.execute(
            "UPDATE projects SET status = ?1, updated_at = ?2 WHERE id = ?3",
            (
                ProjectStatus::PendingCheckpoint.to_string(),
                Utc::now().to_rfc3339(),
                &project_id,
            ),
        )?;

        tracing::info!(execution_id = %execution_id, team_id = %team_id, "Paused at checkpoint");
        Ok(())
    }

    /// Clear the checkpoint pause and mark the run in flight again
    pub fn resume_running(&self, execution_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let (project_id, status) = execution_project_status(&conn, execution_id)?;

        if status != ExecutionStatus::PendingCheckpoint {
            return Err(Error::InvalidState(format!(
                "execution {execution_id} is {status}, not pending_checkpoint"
            )));
        }

        conn.execute(
            "UPDATE executions SET status = ?1, pending_team_id = NULL WHERE id = ?2",
            (ExecutionStatus::Running.to_string(), execution_id),
        )?;
        conn.execute(
            "UPDATE projects SET status = ?1, updated_at = ?2 WHERE id = ?3",
            (
                ProjectStatus::Running.to_string(),
                Utc::now().to_rfc3339(),
                &project_id,
            ),
        )?;
        Ok(())
    }

    /// Move the execution and its project to a terminal status, compute
    /// aggregates over completed team executions, and clear the project's
    /// current execution pointer. The run stays in history.
    pub fn finalize_execution(&self, execution_id: &str, status: ExecutionStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "{status} is not a terminal execution status"
            )));
        }

        let conn = self.conn.lock().unwrap();
        let project_id = require_execution_open(&conn, execution_id)?;

        let (total_cost, total_duration_ms): (f64, i64) = conn.query_row(
            r#"
            SELECT COALESCE(SUM(cost), 0), COALESCE(SUM(duration_ms), 0)
            FROM team_executions
            WHERE execution_id = ?1 AND status = 'completed'
            "#,
            [execution_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let now = Utc::now();
        conn.execute(
            r#"
            UPDATE executions
            SET status = ?1, pending_team_id = NULL, total_cost = ?2,
                total_duration_ms = ?3, completed_at = ?4
            WHERE id = ?5
            "#,
            (
                status.to_string(),
                total_cost,
                total_duration_ms,
                now.to_rfc3339(),
                execution_id,
            ),
        )?;

        let project_status = match status {
            ExecutionStatus::Completed => ProjectStatus::Completed,
            ExecutionStatus::Failed => ProjectStatus::Failed,
            ExecutionStatus::Denied => ProjectStatus::Denied,
            // unreachable: guarded above
            other => {
                return Err(Error::InvalidState(format!(
                    "{other} is not a terminal execution status"
                )))
            }
        };
        conn.execute(
            r#"
            UPDATE projects SET status = ?1, current_execution_id = NULL, updated_at = ?2
            WHERE id = ?3
            "#,
            (project_status.to_string(), now.to_rfc3339(), &project_id),
        )?;

        tracing::info!(
            execution_id = %execution_id,
            status = %status,
            total_cost = total_cost,
            total_duration_ms = total_duration_ms,
            "Finalized execution"
        );
        Ok(())
    }
}

fn execution_project_status(
    conn: &Connection,
    execution_id: &str,
) -> Result<(String, ExecutionStatus)> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT project_id, status FROM executions WHERE id = ?1",
            [execution_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (project_id, status) =
        row.ok_or_else(|| Error::NotFound(format!("execution {execution_id}")))?;
    Ok((project_id, status.parse()?))
}

/// Terminal executions are immutable; reject transitions on them
fn require_execution_open(conn: &Connection, execution_id: &str) -> Result<String> {
    let (project_id, status) = execution_project_status(conn, execution_id)?;
    if status.is_terminal() {
        return Err(Error::InvalidState(format!(
            "execution {execution_id} is already terminal ({status})"
        )));
    }
    Ok(project_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn project_with_team(db: &Database) -> (String, String) {
        let project = db.create_project("demo", "").unwrap();
        let team = db
            .add_team(&project.id, "Backend", &["coder".to_string()], true)
            .unwrap();
        (project.id, team.id)
    }

    #[test]
    fn test_claim_run_conflict() {
        let db = test_db();
        let (project_id, _) = project_with_team(&db);

        let execution = db.claim_run(&project_id).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);

        let project = db.get_project(&project_id).unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Running);
        assert_eq!(project.current_execution_id.as_deref(), Some(execution.id.as_str()));

        assert!(matches!(db.claim_run(&project_id), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_claim_run_unknown_project() {
        let db = test_db();
        assert!(matches!(db.claim_run("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_claim_run_rejects_project_without_teams() {
        let db = test_db();
        let project = db.create_project("empty", "").unwrap();
        let team = db
            .add_team(&project.id, "Only", &["coder".to_string()], false)
            .unwrap();
        db.delete_team(&team.id).unwrap();

        assert!(matches!(
            db.claim_run(&project.id),
            Err(Error::InvalidState(_))
        ));

        // the rejected claim left no execution and no status change behind
        let loaded = db.get_project(&project.id).unwrap().unwrap();
        assert_eq!(loaded.status, ProjectStatus::Draft);
        assert!(loaded.current_execution_id.is_none());
        assert!(db.list_executions(&project.id).unwrap().is_empty());
    }

    #[test]
    fn test_team_execution_lifecycle_and_aggregates() {
        let db = test_db();
        let (project_id, team_id) = project_with_team(&db);
        let execution = db.claim_run(&project_id).unwrap();

        let te = db.start_team_execution(&execution.id, &team_id).unwrap();
        db.complete_team_execution(&te.id, &["out-a".to_string()], "combined", 1500, 0.25)
            .unwrap();
        db.finalize_execution(&execution.id, ExecutionStatus::Completed)
            .unwrap();

        let loaded = db.get_execution(&execution.id).unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Completed);
        assert_eq!(loaded.total_duration_ms, 1500);
        assert!((loaded.total_cost - 0.25).abs() < f64::EPSILON);
        assert!(loaded.completed_at.is_some());
        assert_eq!(loaded.team_executions.len(), 1);
        assert_eq!(loaded.team_executions[0].output, "combined");
        assert_eq!(loaded.team_executions[0].agent_outputs, vec!["out-a"]);

        let project = db.get_project(&project_id).unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Completed);
        assert!(project.current_execution_id.is_none());
    }

    #[test]
    fn test_failed_team_keeps_partial_history() {
        let db = test_db();
        let (project_id, team_id) = project_with_team(&db);
        let execution = db.claim_run(&project_id).unwrap();

        let te = db.start_team_execution(&execution.id, &team_id).unwrap();
        db.fail_team_execution(&te.id, "backend exploded").unwrap();
        db.finalize_execution(&execution.id, ExecutionStatus::Failed)
            .unwrap();

        let history = db.list_executions(&project_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ExecutionStatus::Failed);
        assert_eq!(
            history[0].team_executions[0].error.as_deref(),
            Some("backend exploded")
        );
        // failed attempts contribute nothing to aggregates
        assert_eq!(history[0].total_duration_ms, 0);
    }

    #[test]
    fn test_checkpoint_pause_and_resume() {
        let db = test_db();
        let (project_id, team_id) = project_with_team(&db);
        let execution = db.claim_run(&project_id).unwrap();

        db.set_pending_checkpoint(&execution.id, &team_id).unwrap();
        let loaded = db.get_execution(&execution.id).unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::PendingCheckpoint);
        assert_eq!(loaded.pending_team_id.as_deref(), Some(team_id.as_str()));
        let project = db.get_project(&project_id).unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::PendingCheckpoint);

        db.resume_running(&execution.id).unwrap();
        let loaded = db.get_execution(&execution.id).unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Running);
        assert!(loaded.pending_team_id.is_none());

        // resuming a run that is not paused is invalid
        assert!(matches!(
            db.resume_running(&execution.id),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_apply_edit_exactly_once() {
        let db = test_db();
        let (project_id, team_id) = project_with_team(&db);
        let execution = db.claim_run(&project_id).unwrap();
        let te = db.start_team_execution(&execution.id, &team_id).unwrap();

        // editing a running record is invalid
        assert!(matches!(
            db.apply_edit(&te.id, "edited"),
            Err(Error::InvalidState(_))
        ));

        db.complete_team_execution(&te.id, &[], "original", 10, 0.0)
            .unwrap();
        db.apply_edit(&te.id, "edited").unwrap();

        let loaded = db.get_execution(&execution.id).unwrap().unwrap();
        assert_eq!(loaded.team_executions[0].output, "edited");
        assert!(loaded.team_executions[0].edited);

        assert!(matches!(
            db.apply_edit(&te.id, "again"),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_terminal_execution_is_immutable() {
        let db = test_db();
        let (project_id, team_id) = project_with_team(&db);
        let execution = db.claim_run(&project_id).unwrap();
        db.finalize_execution(&execution.id, ExecutionStatus::Denied)
            .unwrap();

        assert!(matches!(
            db.set_pending_checkpoint(&execution.id, &team_id),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            db.finalize_execution(&execution.id, ExecutionStatus::Completed),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_finalize_rejects_non_terminal_status() {
        let db = test_db();
        let (project_id, _) = project_with_team(&db);
        let execution = db.claim_run(&project_id).unwrap();
        assert!(matches!(
            db.finalize_execution(&execution.id, ExecutionStatus::Running),
            Err(Error::InvalidState(_))
        ));
    }
}
