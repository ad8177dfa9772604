//! Verification store behaviour tests
//!
//! These tests drive the store through its public API the way the agent
//! pages do, and check the properties every consumer relies on.
//!
//! Test coverage:
//! - Progress clamping and isolation of writes
//! - Idempotent checkpoint confirmation
//! - Full reset back to the default snapshot
//! - Last-write-wins for product id and stage
//! - Scan → identity hand-off scenario
//! - Rejection of unknown keys and invalid transitions
//! - Scan results arriving after the scan stage

use veriguardx::{
    apply_scan_result, Agent, Checkpoint, Divergence, Stage, Verdict, VerificationError, VerificationState,
    VerificationStore,
};

#[test]
fn test_out_of_range_progress_is_clamped_for_every_agent() {
    let mut store = VerificationStore::new();

    for agent in Agent::ALL {
        store.update_agent_progress(agent, 1_000);
        assert_eq!(store.state().agents.get(agent), 100, "{} not clamped high", agent);

        store.update_agent_progress(agent, i64::MIN);
        assert_eq!(store.state().agents.get(agent), 0, "{} not clamped low", agent);
    }
}

#[test]
fn test_progress_update_changes_only_the_target_entry() {
    let mut store = VerificationStore::new();
    store.set_product_id("PART-003");
    store.mark_provenance_complete();

    for agent in Agent::ALL {
        let before = store.snapshot();
        store.update_agent_progress(agent, 37);

        let mut expected = before;
        expected.agents.set(agent, 37);
        assert_eq!(store.snapshot(), expected);
    }
}

#[test]
fn test_every_mark_operation_is_idempotent() {
    let mut store = VerificationStore::new();
    let marks: [(fn(&mut VerificationStore), Checkpoint); 5] = [
        (VerificationStore::mark_scan_complete, Checkpoint::Scan),
        (VerificationStore::mark_identity_complete, Checkpoint::Identity),
        (VerificationStore::mark_provenance_complete, Checkpoint::Provenance),
        (VerificationStore::mark_anomaly_complete, Checkpoint::Anomaly),
        (VerificationStore::mark_risk_complete, Checkpoint::Risk),
    ];

    for (mark, checkpoint) in marks {
        mark(&mut store);
        let once = store.snapshot();
        mark(&mut store);

        assert!(store.state().flags.is_complete(checkpoint));
        assert_eq!(store.snapshot(), once);
    }
}

#[test]
fn test_reset_restores_exact_default_snapshot() {
    let mut store = VerificationStore::new();
    store.set_product_id("PART-001");
    for agent in Agent::ALL {
        store.update_agent_progress(agent, 88);
    }
    for checkpoint in Checkpoint::ALL {
        store.mark_complete(checkpoint);
    }
    for stage in [
        Stage::Identity,
        Stage::Courier,
        Stage::Provenance,
        Stage::Anomaly,
        Stage::Risk,
        Stage::Council,
    ] {
        store.set_current_step(stage).unwrap();
    }
    assert!(store.state().completed);

    store.reset();

    let state = store.state();
    assert_eq!(*state, VerificationState::default());
    assert_eq!(state.current_step, Stage::Scan);
    assert!(state.product_id.is_none());
    assert!(Agent::ALL.iter().all(|agent| state.agents.get(*agent) == 0));
    assert!(Checkpoint::ALL.iter().all(|c| !state.flags.is_complete(*c)));
    assert!(!state.completed);
}

#[test]
fn test_product_id_is_last_write_wins() {
    let mut store = VerificationStore::new();
    for id in ["PART-001", "PART-002", "PART-003"] {
        store.set_product_id(id);
    }
    assert_eq!(store.state().product_id.as_deref(), Some("PART-003"));
}

#[test]
fn test_current_step_is_last_write_wins() {
    let mut store = VerificationStore::new();
    store.set_current_step(Stage::Visual).unwrap();
    store.set_current_step(Stage::Identity).unwrap();
    store.set_current_step(Stage::Courier).unwrap();

    assert_eq!(store.state().current_step, Stage::Courier);
    let path: Vec<(Stage, Stage)> = store.history().iter().map(|r| (r.from, r.to)).collect();
    assert_eq!(
        path,
        vec![
            (Stage::Scan, Stage::Visual),
            (Stage::Visual, Stage::Identity),
            (Stage::Identity, Stage::Courier),
        ]
    );
}

#[test]
fn test_scan_to_identity_scenario() {
    let mut store = VerificationStore::new();

    store.set_product_id("PART-001");
    store.update_agent_progress(Agent::Scan, 100);
    store.mark_scan_complete();
    store.set_current_step(Stage::Identity).unwrap();

    let mut expected = VerificationState::default();
    expected.product_id = Some("PART-001".to_string());
    expected.agents.scan = 100;
    expected.flags.is_scan_complete = true;
    expected.current_step = Stage::Identity;

    assert_eq!(store.snapshot(), expected);
    assert!(store.divergences().is_empty());
}

#[test]
fn test_string_keyed_writes_are_validated() {
    let mut store = VerificationStore::new();

    store.update_agent_progress_by_key("Identity", 40).unwrap();
    assert_eq!(store.state().agents.identity, 40);

    assert_eq!(
        store.update_agent_progress_by_key("marketplace", 40),
        Err(VerificationError::UnknownAgent { key: "marketplace".to_string() })
    );
    assert_eq!(
        store.set_current_step_by_name("dashboard"),
        Err(VerificationError::UnknownStage { name: "dashboard".to_string() })
    );
    assert!(matches!(
        store.mark_complete_by_name("courier"),
        Err(VerificationError::UnknownCheckpoint { .. })
    ));
    assert_eq!(
        store.set_current_step_by_name("anomaly"),
        Err(VerificationError::InvalidTransition { from: Stage::Scan, to: Stage::Anomaly })
    );

    store.set_current_step_by_name("visual").unwrap();
    assert_eq!(store.state().current_step, Stage::Visual);
}

#[test]
fn test_council_is_only_left_through_reset() {
    let mut store = VerificationStore::new();
    for stage in [
        Stage::Identity,
        Stage::Courier,
        Stage::Provenance,
        Stage::Anomaly,
        Stage::Risk,
        Stage::Council,
    ] {
        store.set_current_step(stage).unwrap();
    }

    for stage in Stage::ALL.into_iter().filter(|s| *s != Stage::Council) {
        assert!(store.set_current_step(stage).is_err());
    }

    store.reset();
    assert!(store.set_current_step(Stage::Identity).is_ok());
}

#[test]
fn test_progress_and_completion_tracks_can_diverge() {
    let mut store = VerificationStore::new();
    store.update_agent_progress(Agent::Anomaly, 100);
    store.mark_risk_complete();

    assert_eq!(
        store.divergences(),
        vec![
            Divergence::ProgressWithoutCompletion { checkpoint: Checkpoint::Anomaly },
            Divergence::CompletionWithoutProgress { checkpoint: Checkpoint::Risk, progress: 0 },
        ]
    );

    let summary = store.summary();
    assert_eq!(summary.divergences.len(), 2);
    assert_eq!(summary.completed_checkpoints, vec![Checkpoint::Risk]);
}

#[test]
fn test_late_review_verdict_leaves_in_flight_product_alone() {
    let mut store = VerificationStore::new();
    apply_scan_result(&mut store, "PART-001", Verdict::Authentic).unwrap();
    store.set_current_step(Stage::Courier).unwrap();
    let before = store.snapshot();
    let history_len = store.history().len();

    let result = apply_scan_result(&mut store, "PART-999", Verdict::NeedsReview);

    assert_eq!(
        result,
        Err(VerificationError::InvalidTransition { from: Stage::Courier, to: Stage::Scan })
    );
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.history().len(), history_len);
}

#[test]
fn test_injected_state_is_validated() {
    let mut state = VerificationState::default();
    state.agents.scan = 250;
    assert_eq!(
        VerificationStore::with_state(state).unwrap_err(),
        VerificationError::ProgressOutOfRange { agent: Agent::Scan, progress: 250 }
    );

    let state = VerificationState {
        current_step: Stage::Council,
        completed: false,
        ..Default::default()
    };
    assert!(matches!(
        VerificationStore::with_state(state),
        Err(VerificationError::CompletedFlagMismatch { step: Stage::Council, completed: false })
    ));
}
