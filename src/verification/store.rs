use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::errors::VerificationError;
use super::summary::PipelineSummary;
use super::transitions::StageTransitionRecord;
use super::types::{Agent, Checkpoint, Divergence, Stage, VerificationState};

/// Single-writer owner of the verification state.
///
/// Every accepted write publishes a fresh snapshot to all receivers handed
/// out by [`VerificationStore::subscribe`]. Rejected writes publish nothing.
#[derive(Debug)]
pub struct VerificationStore {
    state: VerificationState,
    history: Vec<StageTransitionRecord>,
    publisher: watch::Sender<VerificationState>,
}

impl Default for VerificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationStore {
    pub fn new() -> Self {
        Self::build(VerificationState::default(), Vec::new())
    }

    /// Resume from a previously captured snapshot
    pub fn with_state(state: VerificationState) -> Result<Self, VerificationError> {
        Self::from_parts(state, Vec::new())
    }

    /// Resume from a captured snapshot and its transition history.
    ///
    /// The state is validated first and the history, when present, must end
    /// at the current step.
    pub fn from_parts(
        state: VerificationState,
        history: Vec<StageTransitionRecord>,
    ) -> Result<Self, VerificationError> {
        Self::check_parts(&state, &history)?;
        Ok(Self::build(state, history))
    }

    pub(crate) fn check_parts(
        state: &VerificationState,
        history: &[StageTransitionRecord],
    ) -> Result<(), VerificationError> {
        state.validate()?;
        match history.last() {
            Some(last) if last.to != state.current_step => Err(VerificationError::HistoryMismatch {
                last: last.to,
                step: state.current_step,
            }),
            _ => Ok(()),
        }
    }

    fn build(state: VerificationState, history: Vec<StageTransitionRecord>) -> Self {
        let (publisher, _) = watch::channel(state.clone());
        Self {
            state,
            history,
            publisher,
        }
    }

    pub fn state(&self) -> &VerificationState {
        &self.state
    }

    pub fn snapshot(&self) -> VerificationState {
        self.state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VerificationState> {
        self.publisher.subscribe()
    }

    pub fn history(&self) -> &[StageTransitionRecord] {
        &self.history
    }

    pub fn divergences(&self) -> Vec<Divergence> {
        self.state.divergences()
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary::from_state(&self.state)
    }

    fn publish(&self) {
        self.publisher.send_replace(self.state.clone());
    }

    pub fn update_agent_progress(&mut self, agent: Agent, percent: i64) {
        let stored = self.state.agents.set(agent, percent);
        debug!(agent = %agent, requested = percent, progress = stored, "Agent progress updated");
        self.publish();
    }

    pub fn update_agent_progress_by_key(&mut self, key: &str, percent: i64) -> Result<(), VerificationError> {
        let agent = key.parse::<Agent>().inspect_err(|e| {
            warn!(key = %key, "Rejected progress update: {}", e);
        })?;
        self.update_agent_progress(agent, percent);
        Ok(())
    }

    /// Move to `step` if the transition table allows it.
    pub fn set_current_step(&mut self, step: Stage) -> Result<(), VerificationError> {
        let from = self.state.current_step;
        if let Err(e) = from.validate_transition(step) {
            warn!(from = %from, to = %step, "Rejected stage transition");
            return Err(e);
        }
        if from == step {
            return Ok(());
        }

        self.state.current_step = step;
        if step.is_terminal() {
            self.state.completed = true;
        }
        self.history.push(StageTransitionRecord {
            from,
            to: step,
            timestamp: Utc::now(),
        });
        info!(
            from = %from,
            to = %step,
            product_id = ?self.state.product_id,
            "Pipeline stage transition"
        );
        self.publish();
        Ok(())
    }

    pub fn set_current_step_by_name(&mut self, name: &str) -> Result<(), VerificationError> {
        let step = name.parse::<Stage>().inspect_err(|e| {
            warn!(name = %name, "Rejected stage transition: {}", e);
        })?;
        self.set_current_step(step)
    }

    pub fn set_product_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        info!(product_id = %id, "Product id set");
        self.state.product_id = Some(id);
        self.publish();
    }

    pub fn mark_complete(&mut self, checkpoint: Checkpoint) {
        if self.state.flags.mark(checkpoint) {
            info!(checkpoint = %checkpoint, "Checkpoint marked complete");
        }
        self.publish();
    }

    pub fn mark_complete_by_name(&mut self, name: &str) -> Result<(), VerificationError> {
        let checkpoint = name.parse::<Checkpoint>()?;
        self.mark_complete(checkpoint);
        Ok(())
    }

    pub fn mark_scan_complete(&mut self) {
        self.mark_complete(Checkpoint::Scan);
    }

    pub fn mark_identity_complete(&mut self) {
        self.mark_complete(Checkpoint::Identity);
    }

    pub fn mark_provenance_complete(&mut self) {
        self.mark_complete(Checkpoint::Provenance);
    }

    pub fn mark_anomaly_complete(&mut self) {
        self.mark_complete(Checkpoint::Anomaly);
    }

    pub fn mark_risk_complete(&mut self) {
        self.mark_complete(Checkpoint::Risk);
    }

    /// Restore the default snapshot and drop the transition history
    pub fn reset(&mut self) {
        self.state = VerificationState::default();
        self.history.clear();
        info!("Verification state reset");
        self.publish();
    }
}
