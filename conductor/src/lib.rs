//! Project/team orchestration engine with human-in-loop checkpoints
//!
//! A project is an ordered list of teams; each team is an ordered list of
//! agents executed as one unit by a remote backend. The engine runs teams
//! sequentially, threads each team's output into the next team's input,
//! and pauses at configurable checkpoints for a human to approve, deny,
//! or edit before the run continues.

pub mod backend;
pub mod checkpoint;
pub mod cli;
pub mod context;
pub mod engine;
pub mod error;
pub mod models;
pub mod store;
pub mod stream;

pub use engine::{ExecutionEngine, RunOutcome};
pub use error::{Error, Result};
pub use store::Database;
