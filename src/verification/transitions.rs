// Stage transition table for the verification pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::VerificationError;
use super::types::Stage;

impl Stage {
    /// Stages reachable from this one in a single step
    pub fn successors(&self) -> &'static [Stage] {
        match self {
            Stage::Scan => &[Stage::Identity, Stage::Visual],
            Stage::Visual => &[Stage::Identity],
            Stage::Identity => &[Stage::Courier],
            Stage::Courier => &[Stage::Provenance],
            Stage::Provenance => &[Stage::Anomaly],
            Stage::Anomaly => &[Stage::Risk],
            Stage::Risk => &[Stage::Council],
            Stage::Council => &[],
        }
    }

    pub fn can_transition_to(&self, next: Stage) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Check a move against the table. Staying put is accepted.
    pub fn validate_transition(&self, next: Stage) -> Result<(), VerificationError> {
        if *self == next || self.can_transition_to(next) {
            Ok(())
        } else {
            Err(VerificationError::InvalidTransition { from: *self, to: next })
        }
    }
}

/// Record of an accepted stage change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransitionRecord {
    pub from: Stage,
    pub to: Stage,
    pub timestamp: DateTime<Utc>,
}

/// Complete paths through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineRoute {
    /// Digital tag verified: scan straight into identity
    Standard,
    /// Tag failed or flagged: visual audit before identity
    VisualAudit,
}

impl PipelineRoute {
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            PipelineRoute::Standard => &[
                Stage::Scan,
                Stage::Identity,
                Stage::Courier,
                Stage::Provenance,
                Stage::Anomaly,
                Stage::Risk,
                Stage::Council,
            ],
            PipelineRoute::VisualAudit => &[
                Stage::Scan,
                Stage::Visual,
                Stage::Identity,
                Stage::Courier,
                Stage::Provenance,
                Stage::Anomaly,
                Stage::Risk,
                Stage::Council,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_follow_transition_table() {
        for route in [PipelineRoute::Standard, PipelineRoute::VisualAudit] {
            for pair in route.stages().windows(2) {
                assert!(
                    pair[0].can_transition_to(pair[1]),
                    "{:?}: {} -> {} not in table",
                    route,
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn test_council_is_only_terminal_stage() {
        let terminal: Vec<Stage> = Stage::ALL.into_iter().filter(Stage::is_terminal).collect();
        assert_eq!(terminal, vec![Stage::Council]);
    }

    #[test]
    fn test_validate_transition() {
        assert!(Stage::Scan.validate_transition(Stage::Visual).is_ok());
        assert!(Stage::Anomaly.validate_transition(Stage::Anomaly).is_ok());
        assert_eq!(
            Stage::Scan.validate_transition(Stage::Risk),
            Err(VerificationError::InvalidTransition { from: Stage::Scan, to: Stage::Risk })
        );
        assert!(Stage::Council.validate_transition(Stage::Scan).is_err());
    }

    #[test]
    fn test_no_stage_skips_backwards() {
        assert!(!Stage::Identity.can_transition_to(Stage::Scan));
        assert!(!Stage::Identity.can_transition_to(Stage::Visual));
    }
}
