use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{Agent, AgentProgress, Checkpoint, Divergence, Stage, VerificationState};

/// Aggregate view of a verification session for dashboards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub product_id: Option<String>,
    pub current_step: Stage,
    pub overall_progress: u8,
    pub agents: AgentProgress,
    pub completed_checkpoints: Vec<Checkpoint>,
    pub next_stages: Vec<Stage>,
    pub divergences: Vec<Divergence>,
    pub completed: bool,
}

impl PipelineSummary {
    pub fn from_state(state: &VerificationState) -> Self {
        Self {
            product_id: state.product_id.clone(),
            current_step: state.current_step,
            overall_progress: state.agents.overall(),
            agents: state.agents,
            completed_checkpoints: state.flags.completed(),
            next_stages: state.current_step.successors().to_vec(),
            divergences: state.divergences(),
            completed: state.completed,
        }
    }
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Product:   {}", self.product_id.as_deref().unwrap_or("(none)"))?;
        writeln!(f, "Stage:     {}", self.current_step)?;
        writeln!(f, "Progress:  {}%", self.overall_progress)?;
        for agent in Agent::ALL {
            writeln!(f, "  {:<11} {:>3}%", agent.as_str(), self.agents.get(agent))?;
        }

        let confirmed: Vec<&str> = self.completed_checkpoints.iter().map(|c| c.as_str()).collect();
        writeln!(f, "Confirmed: {}", if confirmed.is_empty() { "-".to_string() } else { confirmed.join(", ") })?;

        let next: Vec<&str> = self.next_stages.iter().map(|s| s.as_str()).collect();
        writeln!(f, "Next:      {}", if next.is_empty() { "-".to_string() } else { next.join(", ") })?;

        for divergence in &self.divergences {
            match divergence {
                Divergence::ProgressWithoutCompletion { checkpoint } => {
                    writeln!(f, "⚠️  {} reports 100% but is not confirmed", checkpoint)?;
                }
                Divergence::CompletionWithoutProgress { checkpoint, progress } => {
                    writeln!(f, "⚠️  {} confirmed at {}% progress", checkpoint, progress)?;
                }
            }
        }
        write!(f, "Completed: {}", self.completed)
    }
}
