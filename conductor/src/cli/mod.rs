//! CLI surface over the orchestration engine
//!
//! One subcommand per store/engine operation. Exit codes map to the
//! error taxonomy via `Error::exit_code` in `main`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::backend::HttpBackend;
use crate::checkpoint::CheckpointDecision;
use crate::engine::{ExecutionEngine, RunOutcome};
use crate::models::{Execution, Project};
use crate::store::Database;
use crate::stream::ExecutionTimeline;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Project/team orchestration with human-in-loop checkpoints")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Execution backend base URL
    #[arg(
        long,
        env = "CONDUCTOR_BACKEND_URL",
        default_value = "http://localhost:8080"
    )]
    pub backend_url: String,

    /// Database path (defaults to ~/.conductor/conductor.db)
    #[arg(long, env = "CONDUCTOR_DB")]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new project
    CreateProject {
        name: String,
        /// Project description
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Update a project's name or description
    UpdateProject {
        project: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a project (rejected while a run is active)
    DeleteProject { project: String },
    /// List all projects
    ListProjects,
    /// Show a project with its teams and current execution
    ShowProject { project: String },
    /// Add a team at the end of a project's execution order
    AddTeam {
        project: String,
        name: String,
        /// Agent identifiers, comma separated
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,
        /// Do not pause for review after this team completes
        #[arg(long)]
        no_checkpoint: bool,
    },
    /// Update a team's name, agents, or checkpoint flag
    UpdateTeam {
        team: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_delimiter = ',')]
        agents: Option<Vec<String>>,
        #[arg(long)]
        checkpoint: Option<bool>,
    },
    /// Delete a team (the remainder is renumbered)
    DeleteTeam { team: String },
    /// Reorder a project's teams to the given id sequence
    ReorderTeams {
        project: String,
        /// Every team id of the project, in the new order
        team_ids: Vec<String>,
    },
    /// Start a new execution of a project
    Run { project: String },
    /// Apply a checkpoint decision to a paused execution
    Resume {
        project: String,
        execution: String,
        /// One of: approve, deny, edit, skip
        decision: String,
        /// Replacement output, required for the edit decision
        #[arg(long)]
        output: Option<String>,
    },
    /// List a project's execution history
    History { project: String },
    /// Fold a status event stream from stdin into a timeline
    Tail,
}

/// Dispatch a parsed CLI invocation
pub async fn execute(cli: Cli) -> Result<()> {
    let db = match cli.db {
        Some(path) => Database::open_at(path),
        None => Database::open(),
    }
    .context("failed to open execution store")?;

    match cli.command {
        Commands::CreateProject { name, description } => {
            let project = db.create_project(&name, &description)?;
            println!("Created project {} ({})", project.name, project.id);
        }
        Commands::UpdateProject {
            project,
            name,
            description,
        } => {
            db.update_project(&project, name.as_deref(), description.as_deref())?;
            println!("Updated project {project}");
        }
        Commands::DeleteProject { project } => {
            db.delete_project(&project)?;
            println!("Deleted project {project}");
        }
        Commands::ListProjects => {
            let projects = db.list_projects()?;
            if projects.is_empty() {
                println!("No projects.");
            }
            for project in projects {
                println!(
                    "{}  {:<20} {:<20} {} team(s)",
                    project.id,
                    project.name,
                    project.status,
                    project.teams.len()
                );
            }
        }
        Commands::ShowProject { project } => {
            let project = require_project(&db, &project)?;
            print_project(&project);
        }
        Commands::AddTeam {
            project,
            name,
            agents,
            no_checkpoint,
        } => {
            let team = db.add_team(&project, &name, &agents, !no_checkpoint)?;
            println!(
                "Added team {} ({}) at position {}",
                team.name, team.id, team.execution_order
            );
        }
        Commands::UpdateTeam {
            team,
            name,
            agents,
            checkpoint,
        } => {
            db.update_team(&team, name.as_deref(), agents.as_deref(), checkpoint)?;
            println!("Updated team {team}");
        }
        Commands::DeleteTeam { team } => {
            db.delete_team(&team)?;
            println!("Deleted team {team}");
        }
        Commands::ReorderTeams { project, team_ids } => {
            db.reorder_teams(&project, &team_ids)?;
            println!("Reordered {} team(s)", team_ids.len());
        }
        Commands::Run { project } => {
            let engine = ExecutionEngine::new(db, HttpBackend::new(cli.backend_url));
            let outcome = engine.run(&project).await?;
            print_outcome(&outcome);
        }
        Commands::Resume {
            project,
            execution,
            decision,
            output,
        } => {
            let decision = CheckpointDecision::parse(&decision, output)?;
            let engine = ExecutionEngine::new(db, HttpBackend::new(cli.backend_url));
            let outcome = engine.resume(&project, &execution, decision).await?;
            print_outcome(&outcome);
        }
        Commands::History { project } => {
            let executions = db.list_executions(&project)?;
            if executions.is_empty() {
                println!("No executions.");
            }
            for execution in executions {
                print_execution_line(&execution);
            }
        }
        Commands::Tail => {
            run_tail()?;
        }
    }

    Ok(())
}

fn require_project(db: &Database, id: &str) -> Result<Project> {
    Ok(db
        .get_project(id)?
        .ok_or_else(|| crate::Error::NotFound(format!("project {id}")))?)
}

fn print_project(project: &Project) {
    println!("{}", "═".repeat(60));
    println!("  {} ({})", project.name, project.id);
    if !project.description.is_empty() {
        println!("  {}", project.description);
    }
    println!("  Status: {}", project.status);
    if let Some(ref execution_id) = project.current_execution_id {
        println!("  Current execution: {execution_id}");
    }
    println!("{}", "═".repeat(60));

    for team in &project.teams {
        println!(
            "  {}. {} ({}) agents=[{}] checkpoint={}",
            team.execution_order,
            team.name,
            team.id,
            team.agents.join(", "),
            team.checkpoint_enabled
        );
    }
}

fn print_execution_line(execution: &Execution) {
    println!(
        "{}  {:<20} {} team(s)  {}ms  ${:.4}",
        execution.id,
        execution.status,
        execution.team_executions.len(),
        execution.total_duration_ms,
        execution.total_cost
    );
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed { execution } => {
            println!("\n{}", "═".repeat(60));
            println!("  RUN COMPLETED");
            println!(
                "  {} team(s), {}ms, ${:.4}",
                execution.team_executions.len(),
                execution.total_duration_ms,
                execution.total_cost
            );
            println!("{}", "═".repeat(60));
        }
        RunOutcome::Paused {
            execution,
            team_id,
            review,
        } => {
            println!("\n{}", "═".repeat(60));
            println!("  CHECKPOINT");
            println!("  Execution: {}", execution.id);
            println!("  Awaiting review of team {team_id}");
            if review.flags.is_empty() {
                println!("  Review: {}", review.summary);
            } else {
                println!("  Review: {}", review.summary);
                for flag in &review.flags {
                    println!("    - {flag}");
                }
            }
            println!();
            println!("  Resume with one of:");
            println!("    conductor resume <project> {} approve", execution.id);
            println!("    conductor resume <project> {} deny", execution.id);
            println!(
                "    conductor resume <project> {} edit --output <text>",
                execution.id
            );
            println!("{}", "═".repeat(60));
        }
        RunOutcome::Denied { execution } => {
            println!("\n{}", "═".repeat(60));
            println!("  RUN DENIED");
            println!(
                "  {} team(s) kept in history under execution {}",
                execution.team_executions.len(),
                execution.id
            );
            println!("{}", "═".repeat(60));
        }
    }
}

/// Read status events from stdin, one JSON object per line, and print
/// the folded timeline on EOF.
fn run_tail() -> Result<()> {
    use std::io::BufRead;

    let mut timeline = ExecutionTimeline::new();
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        timeline.apply_line(&line);
    }

    print_timeline(&timeline);
    Ok(())
}

fn print_timeline(timeline: &ExecutionTimeline) {
    println!("{}", "═".repeat(60));
    println!("  EXECUTION TIMELINE");
    println!("{}", "═".repeat(60));

    for entry in &timeline.entries {
        let marker = match entry.state {
            crate::stream::AgentState::Running => "…",
            crate::stream::AgentState::Complete => "✓",
        };
        let parallel = if entry.parallel { " (parallel)" } else { "" };
        println!("  {marker} {}{parallel}", entry.agent);
    }

    if !timeline.files.is_empty() {
        println!("  Files delivered: {}", timeline.files.len());
        let mut paths: Vec<&String> = timeline.files.keys().collect();
        paths.sort();
        for path in paths {
            println!("    {path}");
        }
    }

    for message in &timeline.status_messages {
        println!("  status: {message}");
    }
    if !timeline.side_channel.is_empty() {
        println!("  {} side-channel event(s)", timeline.side_channel.len());
    }
    if timeline.completed {
        println!(
            "  Complete: {}",
            timeline.completion_message.as_deref().unwrap_or("")
        );
        if let Some(ref summary) = timeline.summary {
            println!("  Summary: {summary}");
        }
    }
}
