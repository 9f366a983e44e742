//! Context threading: assembling prior teams' outputs into the next
//! team's input
//!
//! Pure functions only. The completed-only subsequence of team executions
//! is paired with team names in execution order; when a checkpoint edit
//! replaced an output, the edited text is what flows forward.

use serde::{Deserialize, Serialize};

use crate::models::{Project, Team, TeamExecution, TeamExecutionStatus};

/// One prior team's contribution to the next team's input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorTeamOutput {
    pub team_id: String,
    pub team_name: String,
    /// Combined output, post-edit if a checkpoint edit occurred
    pub output: String,
    pub agent_outputs: Vec<String>,
}

/// Build the input context for the next team from the completed team
/// executions so far, preserving team order. Tolerates an empty prior
/// list (first team in a run).
pub fn build_context(teams: &[Team], prior: &[TeamExecution]) -> Vec<PriorTeamOutput> {
    prior
        .iter()
        .filter(|te| te.status == TeamExecutionStatus::Completed)
        .map(|te| {
            let team_name = teams
                .iter()
                .find(|team| team.id == te.team_id)
                .map(|team| team.name.clone())
                .unwrap_or_default();
            PriorTeamOutput {
                team_id: te.team_id.clone(),
                team_name,
                output: te.output.clone(),
                agent_outputs: te.agent_outputs.clone(),
            }
        })
        .collect()
}

/// Render the prompt blob submitted alongside the structured context
pub fn render_prompt(project: &Project, team: &Team, prior: &[PriorTeamOutput]) -> String {
    let mut prompt = format!(
        "Project: {}\n{}\n\nTeam: {}\nAgents: {}\n",
        project.name,
        project.description,
        team.name,
        team.agents.join(", ")
    );

    if !prior.is_empty() {
        prompt.push_str("\nPrevious team outputs:\n");
        for entry in prior {
            prompt.push_str(&format!("\n## {}\n{}\n", entry.team_name, entry.output));
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn team(id: &str, name: &str, order: i64) -> Team {
        Team {
            id: id.to_string(),
            project_id: "p1".to_string(),
            name: name.to_string(),
            agents: vec!["coder".to_string()],
            execution_order: order,
            checkpoint_enabled: true,
            created_at: Utc::now(),
        }
    }

    fn team_execution(team_id: &str, status: TeamExecutionStatus, output: &str) -> TeamExecution {
        TeamExecution {
            id: format!("te-{team_id}"),
            execution_id: "e1".to_string(),
            team_id: team_id.to_string(),
            status,
            agent_outputs: vec![format!("{output}-agent")],
            output: output.to_string(),
            duration_ms: 0,
            cost: 0.0,
            edited: false,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_empty_prior_list() {
        let teams = vec![team("t1", "Backend", 1)];
        assert!(build_context(&teams, &[]).is_empty());
    }

    #[test]
    fn test_only_completed_records_in_order() {
        let teams = vec![team("t1", "Backend", 1), team("t2", "Frontend", 2)];
        let prior = vec![
            team_execution("t1", TeamExecutionStatus::Completed, "api done"),
            team_execution("t2", TeamExecutionStatus::Failed, "broken"),
        ];

        let context = build_context(&teams, &prior);
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].team_name, "Backend");
        assert_eq!(context[0].output, "api done");
        assert_eq!(context[0].agent_outputs, vec!["api done-agent"]);
    }

    #[test]
    fn test_edited_output_flows_forward() {
        let teams = vec![team("t1", "Backend", 1)];
        let mut te = team_execution("t1", TeamExecutionStatus::Completed, "original");
        te.output = "edited by reviewer".to_string();
        te.edited = true;

        let context = build_context(&teams, &[te]);
        assert_eq!(context[0].output, "edited by reviewer");
    }

    #[test]
    fn test_render_prompt_includes_prior_outputs() {
        let project = Project {
            id: "p1".to_string(),
            name: "Shop".to_string(),
            description: "storefront".to_string(),
            teams: Vec::new(),
            status: crate::models::ProjectStatus::Running,
            current_execution_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let next = team("t2", "Frontend", 2);
        let prior = vec![PriorTeamOutput {
            team_id: "t1".to_string(),
            team_name: "Backend".to_string(),
            output: "REST api at /v1".to_string(),
            agent_outputs: Vec::new(),
        }];

        let prompt = render_prompt(&project, &next, &prior);
        assert!(prompt.contains("Team: Frontend"));
        assert!(prompt.contains("## Backend"));
        assert!(prompt.contains("REST api at /v1"));
    }

    #[test]
    fn test_render_prompt_without_prior() {
        let project = Project {
            id: "p1".to_string(),
            name: "Shop".to_string(),
            description: String::new(),
            teams: Vec::new(),
            status: crate::models::ProjectStatus::Running,
            current_execution_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let prompt = render_prompt(&project, &team("t1", "Backend", 1), &[]);
        assert!(!prompt.contains("Previous team outputs"));
    }
}
