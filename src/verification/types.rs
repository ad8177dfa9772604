// Core types for the verification pipeline state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::VerificationError;

/// Agents that report progress, in their fixed display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    Scan,
    Visual,
    Identity,
    Courier,
    Provenance,
    Anomaly,
    Risk,
}

impl Agent {
    pub const ALL: [Agent; 7] = [
        Agent::Scan,
        Agent::Visual,
        Agent::Identity,
        Agent::Courier,
        Agent::Provenance,
        Agent::Anomaly,
        Agent::Risk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::Scan => "scan",
            Agent::Visual => "visual",
            Agent::Identity => "identity",
            Agent::Courier => "courier",
            Agent::Provenance => "provenance",
            Agent::Anomaly => "anomaly",
            Agent::Risk => "risk",
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Agent {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Agent::ALL
            .into_iter()
            .find(|agent| agent.as_str() == key)
            .ok_or_else(|| VerificationError::UnknownAgent { key: s.to_string() })
    }
}

/// Pipeline stages, the value held in `current_step`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Scan,
    Visual,
    Identity,
    Courier,
    Provenance,
    Anomaly,
    Risk,
    Council,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Scan,
        Stage::Visual,
        Stage::Identity,
        Stage::Courier,
        Stage::Provenance,
        Stage::Anomaly,
        Stage::Risk,
        Stage::Council,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scan => "scan",
            Stage::Visual => "visual",
            Stage::Identity => "identity",
            Stage::Courier => "courier",
            Stage::Provenance => "provenance",
            Stage::Anomaly => "anomaly",
            Stage::Risk => "risk",
            Stage::Council => "council",
        }
    }

    /// The agent whose progress this stage drives. The council has none.
    pub fn agent(&self) -> Option<Agent> {
        match self {
            Stage::Scan => Some(Agent::Scan),
            Stage::Visual => Some(Agent::Visual),
            Stage::Identity => Some(Agent::Identity),
            Stage::Courier => Some(Agent::Courier),
            Stage::Provenance => Some(Agent::Provenance),
            Stage::Anomaly => Some(Agent::Anomaly),
            Stage::Risk => Some(Agent::Risk),
            Stage::Council => None,
        }
    }

    /// The completion flag confirmed by finishing this stage, if it has one
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        match self {
            Stage::Scan => Some(Checkpoint::Scan),
            Stage::Identity => Some(Checkpoint::Identity),
            Stage::Provenance => Some(Checkpoint::Provenance),
            Stage::Anomaly => Some(Checkpoint::Anomaly),
            Stage::Risk => Some(Checkpoint::Risk),
            Stage::Visual | Stage::Courier | Stage::Council => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == name)
            .ok_or_else(|| VerificationError::UnknownStage { name: s.to_string() })
    }
}

/// Stages with a one-way completion flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checkpoint {
    Scan,
    Identity,
    Provenance,
    Anomaly,
    Risk,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 5] = [
        Checkpoint::Scan,
        Checkpoint::Identity,
        Checkpoint::Provenance,
        Checkpoint::Anomaly,
        Checkpoint::Risk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::Scan => "scan",
            Checkpoint::Identity => "identity",
            Checkpoint::Provenance => "provenance",
            Checkpoint::Anomaly => "anomaly",
            Checkpoint::Risk => "risk",
        }
    }

    pub fn agent(&self) -> Agent {
        match self {
            Checkpoint::Scan => Agent::Scan,
            Checkpoint::Identity => Agent::Identity,
            Checkpoint::Provenance => Agent::Provenance,
            Checkpoint::Anomaly => Agent::Anomaly,
            Checkpoint::Risk => Agent::Risk,
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Checkpoint {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Checkpoint::ALL
            .into_iter()
            .find(|checkpoint| checkpoint.as_str() == name)
            .ok_or_else(|| VerificationError::UnknownCheckpoint { name: s.to_string() })
    }
}

/// Per-agent completion percentages, always within 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentProgress {
    pub scan: u8,
    pub visual: u8,
    pub identity: u8,
    pub courier: u8,
    pub provenance: u8,
    pub anomaly: u8,
    pub risk: u8,
}

impl AgentProgress {
    pub fn get(&self, agent: Agent) -> u8 {
        match agent {
            Agent::Scan => self.scan,
            Agent::Visual => self.visual,
            Agent::Identity => self.identity,
            Agent::Courier => self.courier,
            Agent::Provenance => self.provenance,
            Agent::Anomaly => self.anomaly,
            Agent::Risk => self.risk,
        }
    }

    fn slot(&mut self, agent: Agent) -> &mut u8 {
        match agent {
            Agent::Scan => &mut self.scan,
            Agent::Visual => &mut self.visual,
            Agent::Identity => &mut self.identity,
            Agent::Courier => &mut self.courier,
            Agent::Provenance => &mut self.provenance,
            Agent::Anomaly => &mut self.anomaly,
            Agent::Risk => &mut self.risk,
        }
    }

    /// Clamp `percent` into 0..=100 and store it. Returns the stored value.
    pub fn set(&mut self, agent: Agent, percent: i64) -> u8 {
        let clamped = percent.clamp(0, 100) as u8;
        *self.slot(agent) = clamped;
        clamped
    }

    /// Entries in the fixed agent order
    pub fn iter(&self) -> impl Iterator<Item = (Agent, u8)> + '_ {
        Agent::ALL.into_iter().map(move |agent| (agent, self.get(agent)))
    }

    /// Integer mean of all agent percentages
    pub fn overall(&self) -> u8 {
        let total: u32 = self.iter().map(|(_, percent)| percent as u32).sum();
        (total / Agent::ALL.len() as u32) as u8
    }
}

/// Confirmed-completion flags, one per checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompletionFlags {
    pub is_scan_complete: bool,
    pub is_identity_complete: bool,
    pub is_provenance_complete: bool,
    pub is_anomaly_complete: bool,
    pub is_risk_complete: bool,
}

impl CompletionFlags {
    pub fn is_complete(&self, checkpoint: Checkpoint) -> bool {
        match checkpoint {
            Checkpoint::Scan => self.is_scan_complete,
            Checkpoint::Identity => self.is_identity_complete,
            Checkpoint::Provenance => self.is_provenance_complete,
            Checkpoint::Anomaly => self.is_anomaly_complete,
            Checkpoint::Risk => self.is_risk_complete,
        }
    }

    /// Set the flag. Returns `true` if it was previously unset.
    pub fn mark(&mut self, checkpoint: Checkpoint) -> bool {
        let flag = match checkpoint {
            Checkpoint::Scan => &mut self.is_scan_complete,
            Checkpoint::Identity => &mut self.is_identity_complete,
            Checkpoint::Provenance => &mut self.is_provenance_complete,
            Checkpoint::Anomaly => &mut self.is_anomaly_complete,
            Checkpoint::Risk => &mut self.is_risk_complete,
        };
        let newly_set = !*flag;
        *flag = true;
        newly_set
    }

    pub fn completed(&self) -> Vec<Checkpoint> {
        Checkpoint::ALL
            .into_iter()
            .filter(|checkpoint| self.is_complete(*checkpoint))
            .collect()
    }
}

/// Snapshot of how far a product has progressed through the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerificationState {
    pub current_step: Stage,
    pub product_id: Option<String>,
    pub agents: AgentProgress,
    pub completed: bool,
    #[serde(flatten)]
    pub flags: CompletionFlags,
}

/// A checkpoint whose progress and completion flag disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    /// Agent reports 100% but the checkpoint was never confirmed
    ProgressWithoutCompletion { checkpoint: Checkpoint },
    /// Checkpoint confirmed while the agent reports less than 100%
    CompletionWithoutProgress { checkpoint: Checkpoint, progress: u8 },
}

impl VerificationState {
    /// Check a state built outside the store, e.g. one read from disk.
    ///
    /// Every percentage must lie in 0..=100 and `completed` must be set
    /// exactly when the current step is terminal.
    pub fn validate(&self) -> Result<(), VerificationError> {
        if let Some((agent, progress)) = self.agents.iter().find(|(_, progress)| *progress > 100) {
            return Err(VerificationError::ProgressOutOfRange { agent, progress });
        }
        if self.completed != self.current_step.is_terminal() {
            return Err(VerificationError::CompletedFlagMismatch {
                step: self.current_step,
                completed: self.completed,
            });
        }
        Ok(())
    }

    pub fn divergences(&self) -> Vec<Divergence> {
        Checkpoint::ALL
            .into_iter()
            .filter_map(|checkpoint| {
                let progress = self.agents.get(checkpoint.agent());
                match (progress == 100, self.flags.is_complete(checkpoint)) {
                    (true, false) => Some(Divergence::ProgressWithoutCompletion { checkpoint }),
                    (false, true) => Some(Divergence::CompletionWithoutProgress { checkpoint, progress }),
                    _ => None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_parsing_is_case_insensitive() {
        assert_eq!("Scan".parse::<Agent>().unwrap(), Agent::Scan);
        assert_eq!(" provenance ".parse::<Agent>().unwrap(), Agent::Provenance);
        assert_eq!(
            "council".parse::<Agent>(),
            Err(VerificationError::UnknownAgent { key: "council".to_string() })
        );
    }

    #[test]
    fn test_stage_parsing_rejects_unknown_names() {
        assert_eq!("COUNCIL".parse::<Stage>().unwrap(), Stage::Council);
        assert!(matches!(
            "dashboard".parse::<Stage>(),
            Err(VerificationError::UnknownStage { .. })
        ));
    }

    #[test]
    fn test_progress_set_clamps() {
        let mut progress = AgentProgress::default();
        assert_eq!(progress.set(Agent::Risk, 250), 100);
        assert_eq!(progress.set(Agent::Visual, -1), 0);
        assert_eq!(progress.set(Agent::Courier, 42), 42);
        assert_eq!(progress.risk, 100);
        assert_eq!(progress.courier, 42);
    }

    #[test]
    fn test_overall_progress_is_integer_mean() {
        let mut progress = AgentProgress::default();
        progress.set(Agent::Scan, 100);
        progress.set(Agent::Identity, 50);
        // 150 / 7
        assert_eq!(progress.overall(), 21);
    }

    #[test]
    fn test_completion_flag_mark_reports_first_set() {
        let mut flags = CompletionFlags::default();
        assert!(flags.mark(Checkpoint::Anomaly));
        assert!(!flags.mark(Checkpoint::Anomaly));
        assert_eq!(flags.completed(), vec![Checkpoint::Anomaly]);
    }

    #[test]
    fn test_divergences_detect_both_directions() {
        let mut state = VerificationState::default();
        state.agents.set(Agent::Scan, 100);
        state.flags.mark(Checkpoint::Risk);
        state.agents.set(Agent::Risk, 60);

        assert_eq!(
            state.divergences(),
            vec![
                Divergence::ProgressWithoutCompletion { checkpoint: Checkpoint::Scan },
                Divergence::CompletionWithoutProgress { checkpoint: Checkpoint::Risk, progress: 60 },
            ]
        );
    }

    #[test]
    fn test_state_serializes_flat_flags() {
        let state = VerificationState::default();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["current_step"], "scan");
        assert_eq!(json["is_scan_complete"], false);
        assert_eq!(json["agents"]["provenance"], 0);
        assert!(json["product_id"].is_null());
    }

    #[test]
    fn test_validate_rejects_out_of_range_progress() {
        let mut state = VerificationState::default();
        assert!(state.validate().is_ok());

        state.agents.anomaly = 101;
        assert_eq!(
            state.validate(),
            Err(VerificationError::ProgressOutOfRange { agent: Agent::Anomaly, progress: 101 })
        );
    }

    #[test]
    fn test_validate_ties_completed_to_terminal_step() {
        let mut state = VerificationState {
            current_step: Stage::Council,
            ..Default::default()
        };
        assert_eq!(
            state.validate(),
            Err(VerificationError::CompletedFlagMismatch { step: Stage::Council, completed: false })
        );

        state.completed = true;
        assert!(state.validate().is_ok());

        state.current_step = Stage::Risk;
        assert!(state.validate().is_err());
    }
}
