// Risk scoring across agent results

pub mod scorecard;

pub use scorecard::{
    AgentContribution, AgentResult, CriticalFailure, RiskAction, RiskError, RiskLevel, RiskScore,
    RiskScorecard, RiskWeights,
};
