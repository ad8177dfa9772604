use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::info;

use crate::config::RiskConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    #[error("Risk weights must sum to 1.0, got {sum:.3}")]
    InvalidWeights { sum: f64 },
    #[error("Confidence for {agent} out of range: {confidence}")]
    ConfidenceOutOfRange { agent: String, confidence: f64 },
}

/// Outcome reported by one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: String,
    pub passed: bool,
    /// 0..=100
    pub confidence: f64,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub issue: Option<String>,
}

impl AgentResult {
    pub fn new(agent: impl Into<String>, passed: bool, confidence: f64) -> Self {
        Self {
            agent: agent.into(),
            passed,
            confidence,
            critical: false,
            issue: None,
        }
    }

    pub fn critical(mut self, issue: impl Into<String>) -> Self {
        self.critical = true;
        self.issue = Some(issue.into());
        self
    }

    /// Lowercase name with every " agent" occurrence removed
    pub fn weight_key(&self) -> String {
        self.agent.to_lowercase().replace(" agent", "").trim().to_string()
    }

    fn score(&self) -> f64 {
        if self.passed {
            self.confidence
        } else {
            0.0
        }
    }

    fn is_critical_failure(&self) -> bool {
        !self.passed && self.critical
    }

    fn validate(&self) -> Result<(), RiskError> {
        if !(0.0..=100.0).contains(&self.confidence) {
            return Err(RiskError::ConfidenceOutOfRange {
                agent: self.agent.clone(),
                confidence: self.confidence,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64, has_critical_failures: bool) -> Self {
        if has_critical_failures || score < 25.0 {
            RiskLevel::Critical
        } else if score < 50.0 {
            RiskLevel::High
        } else if score < 75.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn recommended_action(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Approve and proceed with normal processing",
            RiskLevel::Medium => "Flag for secondary review within 24 hours",
            RiskLevel::High => "Quarantine immediately and escalate to supervisor",
            RiskLevel::Critical => "REJECT - Do not accept part. Contact security immediately.",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskAction {
    RescanSuggested,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalFailure {
    pub agent: String,
    pub issue: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContribution {
    pub agent: String,
    pub passed: bool,
    pub confidence: f64,
    pub weight: f64,
    pub weighted_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    /// 0 = maximum risk, 100 = no risk
    pub overall_score: f64,
    pub risk_level: RiskLevel,
    pub contributions: Vec<AgentContribution>,
    pub critical_failures: Vec<CriticalFailure>,
    pub penalty_applied: f64,
    pub action_required: Option<RiskAction>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-agent weights for the full pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub identity: f64,
    pub provenance: f64,
    pub anomaly: f64,
    pub courier: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            identity: 0.25,
            provenance: 0.30,
            anomaly: 0.25,
            courier: 0.20,
        }
    }
}

impl RiskWeights {
    pub fn validate(&self) -> Result<(), RiskError> {
        let sum = self.identity + self.provenance + self.anomaly + self.courier;
        if (sum - 1.0).abs() > 0.001 {
            return Err(RiskError::InvalidWeights { sum });
        }
        Ok(())
    }

    pub fn weight_for(&self, key: &str) -> f64 {
        match key {
            "identity" => self.identity,
            "provenance" => self.provenance,
            "anomaly" => self.anomaly,
            "courier" => self.courier,
            _ => 0.0,
        }
    }
}

const VISUAL_WEIGHT: f64 = 0.70;
const VISUAL_COURIER_WEIGHT: f64 = 0.30;

/// Aggregates agent results into an overall risk assessment
#[derive(Debug, Clone)]
pub struct RiskScorecard {
    weights: RiskWeights,
    critical_penalty: f64,
    uncertainty_penalty: f64,
    rescan_band: (f64, f64),
}

impl Default for RiskScorecard {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            critical_penalty: 30.0,
            uncertainty_penalty: 10.0,
            rescan_band: (35.0, 45.0),
        }
    }
}

impl RiskScorecard {
    pub fn new(weights: RiskWeights) -> Result<Self, RiskError> {
        weights.validate()?;
        Ok(Self {
            weights,
            ..Default::default()
        })
    }

    pub fn from_config(config: &RiskConfig) -> Result<Self, RiskError> {
        config.weights.validate()?;
        Ok(Self {
            weights: config.weights,
            critical_penalty: config.critical_penalty,
            uncertainty_penalty: config.uncertainty_penalty,
            rescan_band: (config.rescan_band_low, config.rescan_band_high),
        })
    }

    pub fn weights(&self) -> &RiskWeights {
        &self.weights
    }

    /// Score the full pipeline from every agent's result
    pub fn calculate(&self, results: &[AgentResult]) -> Result<RiskScore, RiskError> {
        let weighted: Vec<(&AgentResult, f64)> = results
            .iter()
            .map(|result| (result, self.weights.weight_for(&result.weight_key())))
            .collect();
        self.score(&weighted, 0.0)
    }

    /// Score a visual-only audit, used when the digital tag could not be read
    pub fn calculate_visual_only(&self, visual: &AgentResult, courier: &AgentResult) -> Result<RiskScore, RiskError> {
        let weighted = [(visual, VISUAL_WEIGHT), (courier, VISUAL_COURIER_WEIGHT)];
        self.score(&weighted, self.uncertainty_penalty)
    }

    fn score(&self, weighted: &[(&AgentResult, f64)], base_penalty: f64) -> Result<RiskScore, RiskError> {
        let mut contributions = Vec::with_capacity(weighted.len());
        let mut critical_failures = Vec::new();

        for (result, weight) in weighted {
            result.validate()?;
            let weighted_score = result.score() * weight;
            contributions.push(AgentContribution {
                agent: result.agent.clone(),
                passed: result.passed,
                confidence: result.confidence,
                weight: *weight,
                weighted_score: round2(weighted_score),
            });
            if result.is_critical_failure() {
                critical_failures.push(CriticalFailure {
                    agent: result.agent.clone(),
                    issue: result.issue.clone().unwrap_or_else(|| "Critical failure".to_string()),
                });
            }
        }

        let raw: f64 = weighted.iter().map(|(result, weight)| result.score() * weight).sum();
        let penalty = base_penalty + critical_failures.len() as f64 * self.critical_penalty;
        let unrounded = (raw - penalty).max(0.0);
        let risk_level = RiskLevel::from_score(unrounded, !critical_failures.is_empty());

        let (low, high) = self.rescan_band;
        let action_required = (low..=high)
            .contains(&unrounded)
            .then_some(RiskAction::RescanSuggested);
        let overall_score = round2(unrounded);

        info!(
            overall_score,
            risk_level = %risk_level,
            critical_failures = critical_failures.len(),
            action_required = ?action_required,
            "Risk calculation complete"
        );

        Ok(RiskScore {
            overall_score,
            risk_level,
            contributions,
            critical_failures,
            penalty_applied: penalty,
            action_required,
        })
    }
}

impl RiskScore {
    /// Human-readable report
    pub fn report(&self) -> String {
        let mut lines = vec![
            "RISK ASSESSMENT REPORT".to_string(),
            "=".repeat(50),
            format!("Overall Risk Score: {}/100", self.overall_score),
            format!("Risk Level: {}", self.risk_level),
            String::new(),
            "Agent Contributions:".to_string(),
        ];

        for contribution in &self.contributions {
            let status = if contribution.passed { "✓ PASSED" } else { "✗ FAILED" };
            lines.push(format!(
                "  {}: {:.2} points ({}, {}% confidence)",
                contribution.agent, contribution.weighted_score, status, contribution.confidence
            ));
        }

        if !self.critical_failures.is_empty() {
            lines.push(String::new());
            lines.push("CRITICAL FAILURES DETECTED:".to_string());
            lines.push(format!("  Penalty Applied: -{} points", self.penalty_applied));
            for failure in &self.critical_failures {
                lines.push(format!("  - {}: {}", failure.agent, failure.issue));
            }
        }

        if let Some(RiskAction::RescanSuggested) = self.action_required {
            lines.push(String::new());
            lines.push("Borderline score: rescan suggested".to_string());
        }

        lines.push(String::new());
        lines.push(format!("Recommended Action: {}", self.risk_level.recommended_action()));
        lines.join("\n")
    }
}
