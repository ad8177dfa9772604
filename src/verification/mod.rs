// Verification Pipeline State
//
// Typed, single-writer store tracking how far a product has progressed
// through the agent pipeline, plus the stage transition table it enforces.

pub mod errors;
pub mod store;
pub mod summary;
pub mod transitions;
pub mod types;

pub use errors::VerificationError;
pub use store::VerificationStore;
pub use summary::PipelineSummary;
pub use transitions::{PipelineRoute, StageTransitionRecord};
pub use types::{Agent, AgentProgress, Checkpoint, CompletionFlags, Divergence, Stage, VerificationState};
