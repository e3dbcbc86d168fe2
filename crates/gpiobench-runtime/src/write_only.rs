//! Write-only toggle benchmark.

use crate::worker::{StopHandle, Worker};
use gpiobench_common::{
    BenchReport, BenchResult, Clock, PinId, RateCounter, RealtimeConfig, ResultBoard, SchedPolicy,
    Scenario,
};
use gpiobench_gpio::PinAccess;
use std::sync::Arc;
use tracing::{info, warn};

/// Thread name of the threaded write-only worker.
pub const WRITE_ONLY_WORKER: &str = "thread_bitbang";

/// Iterations between stop checks in the threaded variant.
const STOP_CHECK_STRIDE: u64 = 1 << 16;

/// Toggles one output pin a fixed number of times.
#[derive(Debug, Clone)]
pub struct WriteOnlyBenchmark {
    access: Arc<dyn PinAccess>,
    pin: PinId,
    iterations: u64,
    clock: Arc<dyn Clock>,
}

impl WriteOnlyBenchmark {
    /// Benchmark toggling `pin` `iterations` times.
    #[must_use]
    pub fn new(access: Arc<dyn PinAccess>, pin: PinId, iterations: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            access,
            pin,
            iterations,
            clock,
        }
    }

    /// Run to completion on the calling thread.
    #[must_use]
    pub fn run(&self) -> BenchReport {
        info!(pin = self.pin.number(), iterations = self.iterations, "write-only test started");
        let access = self.access.as_ref();
        let start = self.clock.now();
        for _ in 0..self.iterations {
            access.set(self.pin);
            access.clear(self.pin);
        }
        let elapsed = self.clock.elapsed(start);
        RateCounter::with(self.iterations, elapsed).report(Scenario::WriteOnly)
    }

    /// Run until done or until `stop` fires. A stopped run yields no report.
    #[must_use]
    pub fn run_until_stopped(&self, stop: &StopHandle) -> Option<BenchReport> {
        info!(pin = self.pin.number(), iterations = self.iterations, "write-only test started");
        let access = self.access.as_ref();
        let start = self.clock.now();
        let mut remaining = self.iterations;
        while remaining > 0 {
            if stop.should_stop() {
                warn!(
                    completed = self.iterations - remaining,
                    "write-only test cancelled; no rate reported"
                );
                return None;
            }
            let chunk = remaining.min(STOP_CHECK_STRIDE);
            for _ in 0..chunk {
                access.set(self.pin);
                access.clear(self.pin);
            }
            remaining -= chunk;
        }
        let elapsed = self.clock.elapsed(start);
        Some(RateCounter::with(self.iterations, elapsed).report(Scenario::WriteOnly))
    }

    /// Create a parked worker that runs the benchmark and publishes the
    /// result to `results`.
    ///
    /// # Errors
    ///
    /// Returns [`gpiobench_common::BenchError::WorkerCreation`] if the thread
    /// cannot be spawned.
    pub fn spawn(
        self,
        core: Option<usize>,
        realtime: &RealtimeConfig,
        results: Arc<ResultBoard>,
    ) -> BenchResult<Worker> {
        let worker = Worker::spawn(WRITE_ONLY_WORKER, move |stop| {
            if let Some(report) = self.run_until_stopped(stop) {
                results.publish(report);
            }
        })?;
        if let Some(core) = core {
            worker.bind_to_core(core);
        }
        if realtime.policy != SchedPolicy::Other {
            worker.set_scheduler(realtime.policy, realtime.priority);
        }
        Ok(worker)
    }
}
