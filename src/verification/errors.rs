use thiserror::Error;

use super::types::{Agent, Stage};

/// Errors raised by the verification store when a write is rejected.
///
/// A rejected write never mutates state and never notifies subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("Unknown agent key: {key}")]
    UnknownAgent { key: String },

    #[error("Unknown pipeline stage: {name}")]
    UnknownStage { name: String },

    #[error("Unknown checkpoint: {name}")]
    UnknownCheckpoint { name: String },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("Progress for {agent} is {progress}, outside 0..=100")]
    ProgressOutOfRange { agent: Agent, progress: u8 },

    #[error("Completed flag is {completed} while the current step is {step}")]
    CompletedFlagMismatch { step: Stage, completed: bool },

    #[error("History ends at {last} but the current step is {step}")]
    HistoryMismatch { last: Stage, step: Stage },
}
