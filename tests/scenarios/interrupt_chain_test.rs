//! Interrupt-driven ping-pong scenarios.

use super::common::{board, config, wait_complete, SyncMode, WriteOnly};
use gpiobench_common::{BenchError, PinId, RunState, Scenario};
use gpiobench_runtime::BenchmarkOrchestrator;

fn run_chain(use_registers: bool) {
    let board = board();
    let mut orch = BenchmarkOrchestrator::new(
        &config(use_registers, SyncMode::Interrupt, WriteOnly::Off),
        board.host(),
    )
    .unwrap();
    orch.setup().unwrap();
    assert_eq!(board.binds(), 2);
    assert!(wait_complete(&orch));

    let results = orch.results();
    assert_eq!(results.len(), 1);
    let report = results[0];
    assert_eq!(report.scenario, Scenario::InterruptReadWrite);
    assert_eq!(report.iterations, 200);
    assert!(report.hz.is_some());

    orch.shutdown();
    assert_eq!(board.unbinds(), 2);
    assert_eq!(orch.results().len(), 1);
}

#[test]
fn test_chain_with_registers() {
    run_chain(true);
}

#[test]
fn test_chain_with_api() {
    run_chain(false);
}

#[test]
fn test_bind_failure_unbinds_first_handler() {
    let board = board();
    board.fail_bind_on(PinId(24));
    let mut orch = BenchmarkOrchestrator::new(
        &config(false, SyncMode::Interrupt, WriteOnly::Off),
        board.host(),
    )
    .unwrap();

    let err = orch.setup().unwrap_err();
    assert!(matches!(err, BenchError::InterruptBinding { pin: 24, .. }));
    assert_eq!(orch.state(), RunState::Failed);
    assert_eq!(board.binds(), 1);
    assert_eq!(board.unbinds(), 1);
    assert_eq!(board.held_pins(), 0);
}
