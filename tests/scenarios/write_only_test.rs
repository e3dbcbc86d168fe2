//! Write-only toggle scenarios.

use super::common::{board, config, wait_complete, SyncMode, WriteOnly};
use gpiobench_common::{PinId, Scenario};
use gpiobench_runtime::BenchmarkOrchestrator;

#[test]
fn test_inline_rate_at_one_tick_per_write() {
    let board = board();
    let mut orch = BenchmarkOrchestrator::new(
        &config(true, SyncMode::Polling, WriteOnly::Inline),
        board.host(),
    )
    .unwrap();
    orch.setup().unwrap();

    // The inline run finishes inside setup, before the ping-pong starts.
    let report = orch.result_board().find(Scenario::WriteOnly).unwrap();
    assert_eq!(report.iterations, 1_000);
    assert_eq!(report.elapsed_ticks, 2_000);
    assert_eq!(report.hz, Some(5_000_000));
    assert!(!board.level(PinId(22)));

    assert!(wait_complete(&orch));
    orch.shutdown();
}

#[test]
fn test_threaded_runs_beside_ping_pong() {
    let board = board();
    let mut orch = BenchmarkOrchestrator::new(
        &config(false, SyncMode::Polling, WriteOnly::Threaded),
        board.host(),
    )
    .unwrap();
    orch.setup().unwrap();
    assert!(wait_complete(&orch));

    let results = orch.results();
    assert_eq!(results.len(), 2);
    let report = orch.result_board().find(Scenario::WriteOnly).unwrap();
    assert_eq!(report.iterations, 1_000);
    // Ping-pong writes share the clock, so only the lower bound is fixed.
    assert!(report.elapsed_ticks >= 2_000);
    assert!(orch.result_board().find(Scenario::PollingReadWrite).is_some());

    orch.shutdown();
    assert_eq!(board.held_pins(), 0);
}

#[test]
fn test_disabled_leaves_out_c_alone() {
    let board = board();
    let mut orch = BenchmarkOrchestrator::new(
        &config(false, SyncMode::Polling, WriteOnly::Off),
        board.host(),
    )
    .unwrap();
    orch.setup().unwrap();
    assert!(wait_complete(&orch));
    orch.shutdown();

    assert_eq!(orch.results().len(), 1);
    assert!(orch.result_board().find(Scenario::WriteOnly).is_none());
    assert_eq!(board.claims(), 4);
}
