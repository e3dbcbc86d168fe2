//! Shared helpers for the scenario tests.

#![allow(dead_code)]

use gpiobench_common::{BenchConfig, PinMap};
use gpiobench_gpio::sim::SimBoard;
use gpiobench_runtime::BenchmarkOrchestrator;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on how long any simulated run may take.
pub const RUN_DEADLINE: Duration = Duration::from_secs(10);

/// Read-write strategy under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Interrupt,
    Polling,
}

/// Write-only mode under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOnly {
    Off,
    Inline,
    Threaded,
}

/// Small configuration that finishes quickly on the simulator.
pub fn config(use_registers: bool, sync: SyncMode, write_only: WriteOnly) -> BenchConfig {
    let mut config = BenchConfig::default();
    config.access.use_registers = use_registers;
    config.read_write.interrupt = sync == SyncMode::Interrupt;
    config.read_write.polling = sync == SyncMode::Polling;
    config.write_only.blocking = write_only == WriteOnly::Inline;
    config.write_only.threaded = write_only == WriteOnly::Threaded;
    config.affinity.enabled = false;
    for counts in [&mut config.iterations.registers, &mut config.iterations.api] {
        counts.rw_interrupt = 200;
        counts.rw_polling = 200;
        counts.write_only = 1_000;
    }
    config
}

/// Loopback board wired for the default pin map.
pub fn board() -> SimBoard {
    SimBoard::loopback(&PinMap::default())
}

/// Poll until every selected benchmark has reported or the deadline passes.
pub fn wait_complete(orch: &BenchmarkOrchestrator) -> bool {
    let deadline = Instant::now() + RUN_DEADLINE;
    while !orch.is_complete() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
    true
}
