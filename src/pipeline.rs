// Pipeline driver
//
// Walks a product through every stage of its route, ramping agent progress
// with simulated latency the way the agent pages animate their work.

use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn, Instrument};

use crate::config::PipelineConfig;
use crate::risk::{AgentResult, RiskAction, RiskError, RiskScore, RiskScorecard};
use crate::routing::{apply_scan_result, ScanRouting, Verdict};
use crate::telemetry::{create_pipeline_span, create_stage_span, generate_correlation_id};
use crate::verification::{PipelineRoute, Stage, VerificationError, VerificationState, VerificationStore};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline must start at the scan stage, store is at {current}")]
    NotAtStart { current: Stage },

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Risk(#[from] RiskError),
}

/// What a single scan attempt reports
#[derive(Debug, Clone, PartialEq)]
pub struct ScanAttempt {
    pub verdict: Verdict,
    /// Agent results behind the verdict. Empty when the scanner reports none.
    pub results: Vec<AgentResult>,
}

impl ScanAttempt {
    pub fn new(verdict: Verdict, results: Vec<AgentResult>) -> Self {
        Self { verdict, results }
    }
}

impl From<Verdict> for ScanAttempt {
    fn from(verdict: Verdict) -> Self {
        Self::new(verdict, Vec::new())
    }
}

/// Produces the result of each scan attempt for a part
pub trait ScanSource {
    /// `attempt` is 0 for the first scan and counts up with each rescan
    fn scan(&mut self, product_id: &str, attempt: u32) -> ScanAttempt;
}

/// Every attempt returns the same verdict with no agent results
impl ScanSource for Verdict {
    fn scan(&mut self, _product_id: &str, _attempt: u32) -> ScanAttempt {
        ScanAttempt::from(*self)
    }
}

/// Replays attempts in order, repeating the last one once exhausted
#[derive(Debug, Clone, Default)]
pub struct ScriptedScans {
    attempts: Vec<ScanAttempt>,
}

impl ScriptedScans {
    pub fn new(attempts: Vec<ScanAttempt>) -> Self {
        Self { attempts }
    }
}

impl ScanSource for ScriptedScans {
    fn scan(&mut self, _product_id: &str, attempt: u32) -> ScanAttempt {
        self.attempts
            .get(attempt as usize)
            .or_else(|| self.attempts.last())
            .cloned()
            .unwrap_or_else(|| ScanAttempt::from(Verdict::NeedsReview))
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub correlation_id: String,
    pub routing: ScanRouting,
    /// `None` when the scan was held for manual review
    pub route: Option<PipelineRoute>,
    pub stages_run: Vec<Stage>,
    /// Scans repeated because of a borderline risk score
    pub rescans: u32,
    /// Assessment produced by the risk stage, or by the last scan when the
    /// part was held. `None` when no agent results were reported.
    pub risk: Option<RiskScore>,
    pub final_state: VerificationState,
}

impl PipelineOutcome {
    pub fn reached_council(&self) -> bool {
        self.final_state.current_step == Stage::Council
    }
}

/// Settled scan after any rescans
struct ScanPhase {
    attempt: ScanAttempt,
    assessment: Option<RiskScore>,
    rescans: u32,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineRunner {
    config: PipelineConfig,
    scorecard: RiskScorecard,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            scorecard: RiskScorecard::default(),
        }
    }

    /// Runner with no simulated latency
    pub fn immediate() -> Self {
        Self::new(PipelineConfig {
            step_delay_ms: 0,
            delay_jitter_ms: 0,
            rescan_delay_ms: 0,
            ..Default::default()
        })
    }

    pub fn with_scorecard(mut self, scorecard: RiskScorecard) -> Self {
        self.scorecard = scorecard;
        self
    }

    /// Run with a scan that reports `verdict` and no agent results
    pub async fn run(
        &self,
        store: &mut VerificationStore,
        product_id: &str,
        verdict: Verdict,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut source = verdict;
        self.run_with(store, product_id, &mut source).await
    }

    pub async fn run_with<S: ScanSource>(
        &self,
        store: &mut VerificationStore,
        product_id: &str,
        source: &mut S,
    ) -> Result<PipelineOutcome, PipelineError> {
        let correlation_id = generate_correlation_id();
        let span = create_pipeline_span("run", Some(product_id), Some(&correlation_id));
        self.run_inner(store, product_id, source, correlation_id)
            .instrument(span)
            .await
    }

    async fn run_inner<S: ScanSource>(
        &self,
        store: &mut VerificationStore,
        product_id: &str,
        source: &mut S,
        correlation_id: String,
    ) -> Result<PipelineOutcome, PipelineError> {
        let current = store.state().current_step;
        if current != Stage::Scan {
            return Err(PipelineError::NotAtStart { current });
        }

        info!(product_id = %product_id, "Starting verification pipeline");

        let scan = self
            .scan_until_settled(product_id, source)
            .instrument(create_stage_span(Stage::Scan.as_str(), &correlation_id))
            .await?;
        let routing = apply_scan_result(store, product_id, scan.attempt.verdict)?;
        let mut stages_run = vec![Stage::Scan];

        let route = match routing {
            ScanRouting::Advance(Stage::Visual) => PipelineRoute::VisualAudit,
            ScanRouting::Advance(_) => PipelineRoute::Standard,
            ScanRouting::ManualReview => {
                warn!(product_id = %product_id, "Scan held for manual review");
                return Ok(PipelineOutcome {
                    correlation_id,
                    routing,
                    route: None,
                    stages_run,
                    rescans: scan.rescans,
                    risk: scan.assessment,
                    final_state: store.snapshot(),
                });
            }
        };

        let mut risk = None;
        for &stage in &route.stages()[1..] {
            self.run_stage(store, stage)
                .instrument(create_stage_span(stage.as_str(), &correlation_id))
                .await?;
            if stage == Stage::Risk {
                risk = self.assess_route(route, &scan.attempt.results)?;
            }
            stages_run.push(stage);
        }

        info!(
            product_id = %product_id,
            route = ?route,
            stages = stages_run.len(),
            rescans = scan.rescans,
            risk_level = ?risk.as_ref().map(|score| score.risk_level),
            "Verification pipeline finished"
        );

        Ok(PipelineOutcome {
            correlation_id,
            routing,
            route: Some(route),
            stages_run,
            rescans: scan.rescans,
            risk,
            final_state: store.snapshot(),
        })
    }

    /// Scan until the risk score leaves the rescan band or the rescan budget
    /// runs out. A part still borderline after the last rescan is held for
    /// manual review.
    async fn scan_until_settled<S: ScanSource>(
        &self,
        product_id: &str,
        source: &mut S,
    ) -> Result<ScanPhase, PipelineError> {
        let mut rescans = 0;
        loop {
            self.simulate_latency().await;
            let attempt = source.scan(product_id, rescans);
            let assessment = if attempt.results.is_empty() {
                None
            } else {
                Some(self.scorecard.calculate(&attempt.results)?)
            };

            let borderline = assessment
                .as_ref()
                .is_some_and(|score| score.action_required == Some(RiskAction::RescanSuggested));
            if !borderline {
                return Ok(ScanPhase { attempt, assessment, rescans });
            }

            if rescans >= self.config.max_rescans {
                warn!(
                    product_id = %product_id,
                    rescans,
                    "Risk score still borderline after rescans, holding for manual review"
                );
                return Ok(ScanPhase {
                    attempt: ScanAttempt::new(Verdict::NeedsReview, attempt.results),
                    assessment,
                    rescans,
                });
            }

            rescans += 1;
            warn!(
                product_id = %product_id,
                attempt = rescans,
                score = ?assessment.as_ref().map(|score| score.overall_score),
                "Borderline risk score, rescanning"
            );
            if self.config.rescan_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.rescan_delay_ms)).await;
            }
        }
    }

    /// Score the agent results the way the route's risk stage does
    fn assess_route(&self, route: PipelineRoute, results: &[AgentResult]) -> Result<Option<RiskScore>, RiskError> {
        if results.is_empty() {
            return Ok(None);
        }
        if route == PipelineRoute::VisualAudit {
            let find = |key: &str| results.iter().find(|result| result.weight_key() == key);
            if let (Some(visual), Some(courier)) = (find("visual"), find("courier")) {
                return self.scorecard.calculate_visual_only(visual, courier).map(Some);
            }
        }
        self.scorecard.calculate(results).map(Some)
    }

    async fn run_stage(&self, store: &mut VerificationStore, stage: Stage) -> Result<(), PipelineError> {
        store.set_current_step(stage)?;
        self.ramp_progress(store, stage).await;
        if let Some(checkpoint) = stage.checkpoint() {
            store.mark_complete(checkpoint);
        }
        Ok(())
    }

    async fn ramp_progress(&self, store: &mut VerificationStore, stage: Stage) {
        let Some(agent) = stage.agent() else {
            return;
        };

        let step = i64::from(self.config.progress_step.max(1));
        let mut progress = i64::from(store.state().agents.get(agent));
        while progress < 100 {
            progress = (progress + step).min(100);
            store.update_agent_progress(agent, progress);
            self.simulate_latency().await;
        }
    }

    async fn simulate_latency(&self) {
        let jitter = if self.config.delay_jitter_ms > 0 {
            rand::rng().random_range(0..=self.config.delay_jitter_ms)
        } else {
            0
        };
        let delay = self.config.step_delay_ms.saturating_add(jitter);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}
