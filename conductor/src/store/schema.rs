//! Database schema definitions

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables if they don't exist
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Projects table
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'draft',
            current_execution_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Teams table; execution_order is dense and 1-based per project
        CREATE TABLE IF NOT EXISTS teams (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            name TEXT NOT NULL,
            agents TEXT NOT NULL,
            execution_order INTEGER NOT NULL,
            checkpoint_enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
        );

        -- Executions table (one row per project run)
        CREATE TABLE IF NOT EXISTS executions (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            status TEXT NOT NULL,
            pending_team_id TEXT,
            total_cost REAL NOT NULL DEFAULT 0,
            total_duration_ms INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
        );

        -- Team executions table (append-only, one row per team attempted)
        CREATE TABLE IF NOT EXISTS team_executions (
            id TEXT PRIMARY KEY,
            execution_id TEXT NOT NULL,
            team_id TEXT NOT NULL,
            status TEXT NOT NULL,
            agent_outputs TEXT NOT NULL DEFAULT '[]',
            output TEXT NOT NULL DEFAULT '',
            duration_ms INTEGER NOT NULL DEFAULT 0,
            cost REAL NOT NULL DEFAULT 0,
            edited INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            FOREIGN KEY (execution_id) REFERENCES executions(id) ON DELETE CASCADE
        );

        -- Index for ordered team retrieval per project
        CREATE INDEX IF NOT EXISTS idx_teams_project
        ON teams(project_id, execution_order);

        -- Index for listing a project's run history
        CREATE INDEX IF NOT EXISTS idx_executions_project
        ON executions(project_id, started_at);

        -- Index for ordered team-execution retrieval per run
        CREATE INDEX IF NOT EXISTS idx_team_executions_execution
        ON team_executions(execution_id, started_at);

        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        -- Insert initial version if not exists
        INSERT OR IGNORE INTO schema_version (version) VALUES (1);
        "#,
    )?;

    Ok(())
}

/// Get the current schema version
pub fn get_version(conn: &Connection) -> Result<i32> {
    let version: i32 = conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}
