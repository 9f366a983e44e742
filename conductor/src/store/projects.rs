//! Project and team persistence operations
//!
//! Team lists are only editable while the project has no active run;
//! every insert/delete/reorder renumbers `execution_order` to a dense
//! 1..N sequence.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::Database;
use crate::models::{Project, ProjectStatus, Team};
use crate::{Error, Result};

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    let agents_json: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    Ok(Team {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        agents: serde_json::from_str(&agents_json).unwrap_or_default(),
        execution_order: row.get(4)?,
        checkpoint_enabled: row.get::<_, i64>(5)? != 0,
        created_at: parse_ts(&created_at),
    })
}

const TEAM_COLUMNS: &str =
    "id, project_id, name, agents, execution_order, checkpoint_enabled, created_at";

fn load_teams(conn: &Connection, project_id: &str) -> Result<Vec<Team>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TEAM_COLUMNS} FROM teams WHERE project_id = ?1 ORDER BY execution_order"
    ))?;
    let teams = stmt
        .query_map([project_id], team_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(teams)
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let status: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        teams: Vec::new(),
        status: status.parse().unwrap_or(ProjectStatus::Draft),
        current_execution_id: row.get(4)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

const PROJECT_COLUMNS: &str =
    "id, name, description, status, current_execution_id, created_at, updated_at";

/// Reassign `execution_order` to a dense 1..N sequence, preserving the
/// current relative order.
fn renumber_teams(conn: &Connection, project_id: &str) -> Result<()> {
    let mut stmt = conn
        .prepare("SELECT id FROM teams WHERE project_id = ?1 ORDER BY execution_order, created_at")?;
    let ids = stmt
        .query_map([project_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (index, id) in ids.iter().enumerate() {
        conn.execute(
            "UPDATE teams SET execution_order = ?1 WHERE id = ?2",
            ((index + 1) as i64, id),
        )?;
    }
    Ok(())
}

impl Database {
    // ------------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------------

    /// Create a new project in draft status
    pub fn create_project(&self, name: &str, description: &str) -> Result<Project> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO projects (id, name, description, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            (
                &id,
                name,
                description,
                ProjectStatus::Draft.to_string(),
                now.to_rfc3339(),
            ),
        )?;

        tracing::info!(project_id = %id, name = %name, "Created project");
        Ok(Project {
            id,
            name: name.to_string(),
            description: description.to_string(),
            teams: Vec::new(),
            status: ProjectStatus::Draft,
            current_execution_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a project with its teams ordered by `execution_order`
    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn.lock().unwrap();
        let project = conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                [id],
                project_from_row,
            )
            .optional()?;

        match project {
            Some(mut project) => {
                project.teams = load_teams(&conn, id)?;
                Ok(Some(project))
            }
            None => Ok(None),
        }
    }

    /// List all projects with their teams
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at"
        ))?;
        let mut projects = stmt
            .query_map([], project_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for project in &mut projects {
            project.teams = load_teams(&conn, &project.id)?;
        }
        Ok(projects)
    }

    /// Update a project's name/description. Rejected while a run is active.
    pub fn update_project(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let status = require_project_idle(&conn, id)?;

        if let Some(name) = name {
            conn.execute("UPDATE projects SET name = ?1 WHERE id = ?2", (name, id))?;
        }
        if let Some(description) = description {
            conn.execute(
                "UPDATE projects SET description = ?1 WHERE id = ?2",
                (description, id),
            )?;
        }
        touch_project(&conn, id)?;

        tracing::debug!(project_id = %id, status = %status, "Updated project");
        Ok(())
    }

    /// Delete a project and everything under it. Rejected while a run is
    /// active; deletion is always an explicit operator action.
    pub fn delete_project(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        require_project_idle(&conn, id)?;

        conn.execute("DELETE FROM projects WHERE id = ?1", [id])?;
        tracing::info!(project_id = %id, "Deleted project");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------------

    /// Append a team at the end of the project's execution order
    pub fn add_team(
        &self,
        project_id: &str,
        name: &str,
        agents: &[String],
        checkpoint_enabled: bool,
    ) -> Result<Team> {
        let conn = self.conn.lock().unwrap();
        require_project_idle(&conn, project_id)?;

        let next_order: i64 = conn.query_row(
            "SELECT COALESCE(MAX(execution_order), 0) + 1 FROM teams WHERE project_id = ?1",
            [project_id],
            |row| row.get(0),
        )?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.execute(
            r#"
            INSERT INTO teams (id, project_id, name, agents, execution_order, checkpoint_enabled, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            (
                &id,
                project_id,
                name,
                serde_json::to_string(agents)?,
                next_order,
                checkpoint_enabled as i64,
                now.to_rfc3339(),
            ),
        )?;
        touch_project(&conn, project_id)?;

        tracing::info!(team_id = %id, project_id = %project_id, order = next_order, "Added team");
        Ok(Team {
            id,
            project_id: project_id.to_string(),
            name: name.to_string(),
            agents: agents.to_vec(),
            execution_order: next_order,
            checkpoint_enabled,
            created_at: now,
        })
    }

    /// Update a team's name, agents, or checkpoint flag
    pub fn update_team(
        &self,
        team_id: &str,
        name: Option<&str>,
        agents: Option<&[String]>,
        checkpoint_enabled: Option<bool>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let project_id = team_project(&conn, team_id)?;
        require_project_idle(&conn, &project_id)?;

        if let Some(name) = name {
            conn.execute("UPDATE teams SET name = ?1 WHERE id = ?2", (name, team_id))?;
        }
        if let Some(agents) = agents {
            conn.execute(
                "UPDATE teams SET agents = ?1 WHERE id = ?2",
                (serde_json::to_string(agents)?, team_id),
            )?;
        }
        if let Some(enabled) = checkpoint_enabled {
            conn.execute(
                "UPDATE teams SET checkpoint_enabled = ?1 WHERE id = ?2",
                (enabled as i64, team_id),
            )?;
        }
        touch_project(&conn, &project_id)?;
        Ok(())
    }

    /// Delete a team and renumber the remainder
    pub fn delete_team(&self, team_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let project_id = team_project(&conn, team_id)?;
        require_project_idle(&conn, &project_id)?;

        conn.execute("DELETE FROM teams WHERE id = ?1", [team_id])?;
        renumber_teams(&conn, &project_id)?;
        touch_project(&conn, &project_id)?;

        tracing::info!(team_id = %team_id, project_id = %project_id, "Deleted team");
        Ok(())
    }

    /// Reorder teams to match the given id sequence. The sequence must
    /// name every team of the project exactly once.
    pub fn reorder_teams(&self, project_id: &str, ordered_team_ids: &[String]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        require_project_idle(&conn, project_id)?;

        let existing: Vec<String> = {
            let mut stmt =
                conn.prepare("SELECT id FROM teams WHERE project_id = ?1 ORDER BY execution_order")?;
            let rows = stmt
                .query_map([project_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        if existing.len() != ordered_team_ids.len()
            || !ordered_team_ids.iter().all(|id| existing.contains(id))
        {
            return Err(Error::InvalidState(format!(
                "reorder must name all {} teams of project {} exactly once",
                existing.len(),
                project_id
            )));
        }

        for (index, id) in ordered_team_ids.iter().enumerate() {
            conn.execute(
                "UPDATE teams SET execution_order = ?1 WHERE id = ?2",
                ((index + 1) as i64, id),
            )?;
        }
        touch_project(&conn, project_id)?;

        tracing::info!(project_id = %project_id, teams = existing.len(), "Reordered teams");
        Ok(())
    }

    /// Get a team by id
    pub fn get_team(&self, team_id: &str) -> Result<Option<Team>> {
        let conn = self.conn.lock().unwrap();
        let team = conn
            .query_row(
                &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?1"),
                [team_id],
                team_from_row,
            )
            .optional()?;
        Ok(team)
    }
}

fn touch_project(conn: &Connection, project_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
        (Utc::now().to_rfc3339(), project_id),
    )?;
    Ok(())
}

/// Look up a team's owning project, NotFound if the team is unknown
fn team_project(conn: &Connection, team_id: &str) -> Result<String> {
    conn.query_row(
        "SELECT project_id FROM teams WHERE id = ?1",
        [team_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("team {team_id}")))
}

/// Reject mutation while the project has an active run
fn require_project_idle(conn: &Connection, project_id: &str) -> Result<ProjectStatus> {
    let status: Option<String> = conn
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
            "project {project_id} has an active execution ({status})"
        )));
    }
    Ok(status)
}
