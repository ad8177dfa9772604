// Scan verdict routing
//
// Decides where a part goes after its scan and applies that decision to the
// verification store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::verification::{Agent, Stage, VerificationError, VerificationStore};

/// Classification attached to a scan result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Authentic,
    Approved,
    Safe,
    Verified,
    Counterfeit,
    Suspicious,
    NeedsReview,
    ManualReview,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Authentic => "AUTHENTIC",
            Verdict::Approved => "APPROVED",
            Verdict::Safe => "SAFE",
            Verdict::Verified => "VERIFIED",
            Verdict::Counterfeit => "COUNTERFEIT",
            Verdict::Suspicious => "SUSPICIOUS",
            Verdict::NeedsReview => "NEEDS_REVIEW",
            Verdict::ManualReview => "MANUAL_REVIEW",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Verdict::Authentic | Verdict::Approved | Verdict::Safe | Verdict::Verified
        )
    }

    /// Lenient parse: anything unrecognised is treated as needing review
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            warn!(verdict = %s, "Unrecognised verdict, treating as NEEDS_REVIEW");
            Verdict::NeedsReview
        })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "AUTHENTIC" => Ok(Verdict::Authentic),
            "APPROVED" => Ok(Verdict::Approved),
            "SAFE" => Ok(Verdict::Safe),
            "VERIFIED" => Ok(Verdict::Verified),
            "COUNTERFEIT" => Ok(Verdict::Counterfeit),
            "SUSPICIOUS" => Ok(Verdict::Suspicious),
            "NEEDS_REVIEW" => Ok(Verdict::NeedsReview),
            "MANUAL_REVIEW" => Ok(Verdict::ManualReview),
            other => Err(format!("unknown verdict: {}", other)),
        }
    }
}

/// What happens to a part after its scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanRouting {
    Advance(Stage),
    /// Part stays at the scan stage until a human reviews it
    ManualReview,
}

pub fn route_scan(verdict: Verdict) -> ScanRouting {
    match verdict {
        v if v.is_success() => ScanRouting::Advance(Stage::Identity),
        Verdict::Counterfeit | Verdict::Suspicious => ScanRouting::Advance(Stage::Visual),
        _ => ScanRouting::ManualReview,
    }
}

/// Record a scan result in the store and move to the routed stage.
///
/// Scan results are only accepted while the store sits at the scan stage.
/// This is checked before anything is written, so a rejected result leaves
/// the store untouched.
pub fn apply_scan_result(
    store: &mut VerificationStore,
    product_id: &str,
    verdict: Verdict,
) -> Result<ScanRouting, VerificationError> {
    let routing = route_scan(verdict);
    let target = match routing {
        ScanRouting::Advance(next) => next,
        ScanRouting::ManualReview => Stage::Scan,
    };
    let current = store.state().current_step;
    if current != Stage::Scan {
        warn!(current = %current, verdict = %verdict, "Rejected scan result outside the scan stage");
        return Err(VerificationError::InvalidTransition { from: current, to: target });
    }

    store.set_product_id(product_id);

    match routing {
        ScanRouting::Advance(Stage::Identity) => {
            store.update_agent_progress(Agent::Scan, 100);
            store.mark_scan_complete();
            store.set_current_step(Stage::Identity)?;
        }
        ScanRouting::Advance(next) => {
            store.update_agent_progress(Agent::Scan, 0);
            store.set_current_step(next)?;
        }
        ScanRouting::ManualReview => {}
    }

    info!(
        product_id = %product_id,
        verdict = %verdict,
        routing = ?routing,
        "Scan result applied"
    );
    Ok(routing)
}
