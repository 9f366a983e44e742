//! Execution store: durable record of projects, teams, and executions
//!
//! SQLite-backed. The store is the only shared mutable resource in the
//! system; the engine writes back on every state transition so a process
//! restart resumes from the last durable state.

pub mod executions;
pub mod projects;
pub mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::Result;

/// Database connection wrapper with thread-safe access
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the default location
    /// (~/.conductor/conductor.db)
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open or create the database at a specific path
    pub fn open_at(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                crate::Error::Store(format!("failed to create directory {parent:?}: {e}"))
            })?;
        }

        let conn = Connection::open(&path)
            .map_err(|e| crate::Error::Store(format!("failed to open database at {path:?}: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;

        tracing::info!("Database opened at {:?}", path);
        Ok(db)
    }

    /// Open an in-memory database (tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Get the default database path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| crate::Error::Store("could not determine home directory".into()))?;
        Ok(home.join(".conductor").join("conductor.db"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        schema::create_tables(&conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_database_open_at() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open_at(path.clone()).unwrap();
        assert!(path.exists());
        drop(db);
    }

    #[test]
    fn test_database_open_in_memory() {
        Database::open_in_memory().unwrap();
    }
}
