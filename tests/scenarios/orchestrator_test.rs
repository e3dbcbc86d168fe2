//! Setup validation, rollback and teardown.

use super::common::{board, config, wait_complete, SyncMode, WriteOnly};
use gpiobench_common::{BenchError, PinId, RunState};
use gpiobench_runtime::BenchmarkOrchestrator;

#[test]
fn test_conflicts_acquire_nothing() {
    let board = board();

    let mut both = config(true, SyncMode::Polling, WriteOnly::Inline);
    both.read_write.interrupt = true;
    let mut neither = config(true, SyncMode::Polling, WriteOnly::Inline);
    neither.read_write.polling = false;
    let mut write_only = config(false, SyncMode::Polling, WriteOnly::Inline);
    write_only.write_only.threaded = true;
    let mut shared_pin = config(false, SyncMode::Polling, WriteOnly::Off);
    shared_pin.pins.in_b = shared_pin.pins.in_a;

    for bad in [both, neither, write_only, shared_pin] {
        let err = BenchmarkOrchestrator::new(&bad, board.host()).unwrap_err();
        assert!(matches!(err, BenchError::ConfigurationConflict(_)), "{err}");
    }

    assert_eq!(board.mappings(), 0);
    assert_eq!(board.claims(), 0);
    assert_eq!(board.binds(), 0);
}

#[test]
fn test_register_pin_out_of_range() {
    let board = board();
    let mut bad = config(true, SyncMode::Polling, WriteOnly::Off);
    bad.pins.out_c = PinId(60);
    bad.write_only.blocking = true;

    let err = BenchmarkOrchestrator::new(&bad, board.host()).unwrap_err();
    assert!(matches!(err, BenchError::InvalidConfig(_)));
    assert_eq!(board.mappings(), 0);
}

#[test]
fn test_claim_failure_releases_earlier_pins() {
    let board = board();
    board.fail_claim_on(PinId(24));
    let mut orch = BenchmarkOrchestrator::new(
        &config(false, SyncMode::Polling, WriteOnly::Inline),
        board.host(),
    )
    .unwrap();

    let err = orch.setup().unwrap_err();
    assert!(matches!(err, BenchError::PinAcquisition { pin: 24, .. }));
    assert_eq!(orch.state(), RunState::Failed);
    assert_eq!(board.claims(), 3);
    assert_eq!(board.releases(), 3);
    assert_eq!(board.held_pins(), 0);
    assert!(orch.results().is_empty());
}

#[test]
fn test_direction_failure_releases_claimed_pin() {
    let board = board();
    board.fail_direction_on(PinId(22));
    let mut orch = BenchmarkOrchestrator::new(
        &config(false, SyncMode::Polling, WriteOnly::Inline),
        board.host(),
    )
    .unwrap();

    let err = orch.setup().unwrap_err();
    assert!(matches!(err, BenchError::PinConfiguration { pin: 22, .. }));
    assert_eq!(board.claims(), 5);
    assert_eq!(board.releases(), 5);
    assert_eq!(board.held_pins(), 0);
}

#[test]
fn test_mapping_denied_claims_nothing() {
    let board = board();
    board.deny_mapping();
    let mut orch = BenchmarkOrchestrator::new(
        &config(true, SyncMode::Interrupt, WriteOnly::Inline),
        board.host(),
    )
    .unwrap();

    assert!(matches!(
        orch.setup(),
        Err(BenchError::ResourceMapping { .. })
    ));
    assert_eq!(board.binds(), 0);
    assert_eq!(board.unmaps(), 0);
    orch.shutdown();
    assert_eq!(orch.state(), RunState::Stopped);
}

#[test]
fn test_api_run_releases_every_pin() {
    let board = board();
    let mut orch = BenchmarkOrchestrator::new(
        &config(false, SyncMode::Polling, WriteOnly::Inline),
        board.host(),
    )
    .unwrap();
    orch.setup().unwrap();
    assert_eq!(board.held_pins(), 5);
    assert!(wait_complete(&orch));

    orch.shutdown();
    orch.shutdown();
    assert_eq!(orch.state(), RunState::Stopped);
    assert_eq!(board.releases(), 5);
    assert_eq!(board.held_pins(), 0);
    assert_eq!(board.mappings(), 0);
}

#[test]
fn test_register_run_maps_once() {
    let board = board();
    let mut orch = BenchmarkOrchestrator::new(
        &config(true, SyncMode::Polling, WriteOnly::Inline),
        board.host(),
    )
    .unwrap();
    orch.setup().unwrap();
    assert!(wait_complete(&orch));
    orch.shutdown();

    assert_eq!(board.mappings(), 1);
    assert_eq!(board.unmaps(), 1);
    assert_eq!(board.claims(), 0);
}
