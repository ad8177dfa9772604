// VeriGuardX Library - Supply-chain verification pipeline
// This exposes the core components for testing and integration

pub mod verification;
pub mod routing;
pub mod risk;
pub mod pipeline;
pub mod persistence;
pub mod telemetry;
pub mod config;

// Re-export key types for easy access
pub use verification::{
    Agent, AgentProgress, Checkpoint, CompletionFlags, Divergence, PipelineRoute, PipelineSummary,
    Stage, StageTransitionRecord, VerificationError, VerificationState, VerificationStore,
};
pub use routing::{apply_scan_result, route_scan, ScanRouting, Verdict};
pub use risk::{AgentResult, RiskError, RiskLevel, RiskScore, RiskScorecard, RiskWeights};
pub use pipeline::{PipelineError, PipelineOutcome, PipelineRunner, ScanAttempt, ScanSource, ScriptedScans};
pub use persistence::{PersistenceError, SessionSnapshot, SnapshotStore};
pub use telemetry::{init_telemetry, generate_correlation_id, create_pipeline_span};
pub use crate::config::{VeriGuardConfig, config, init_config};
