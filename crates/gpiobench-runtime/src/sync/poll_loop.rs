//! Ping-pong driven by two polling workers.
//!
//! Worker A answers pair A until stopped; worker B answers pair B for the
//! configured number of round trips, reports, and then stops worker A.
//! In yield mode every poll iteration gives up the CPU, which lets the
//! scheduler add latency to each hop; the reported rate includes it.

use super::RunEpoch;
use crate::worker::{StopHandle, Worker};
use gpiobench_common::{
    BenchResult, Clock, CoreMap, PinId, PinMap, RateCounter, RealtimeConfig, ResultBoard,
    SchedPolicy, Scenario,
};
use gpiobench_gpio::PinAccess;
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

/// Thread name of the worker answering pair A.
pub const WORKER_A: &str = "rw_thread_a";
/// Thread name of the worker answering pair B.
pub const WORKER_B: &str = "rw_thread_b";

/// Polling read-write benchmark.
#[derive(Debug, Clone)]
pub struct PollLoop {
    access: Arc<dyn PinAccess>,
    pins: PinMap,
    iterations: u64,
    yield_cpu: bool,
    epoch: Arc<RunEpoch>,
    clock: Arc<dyn Clock>,
    results: Arc<ResultBoard>,
}

/// Wait while `pin` reads high. Returns `false` if `stop` fired first.
#[inline]
fn wait_low(access: &dyn PinAccess, pin: PinId, stop: &StopHandle, yield_cpu: bool) -> bool {
    while access.read(pin) {
        if stop.should_stop() {
            return false;
        }
        if yield_cpu {
            thread::yield_now();
        } else {
            std::hint::spin_loop();
        }
    }
    true
}

impl PollLoop {
    /// Loop running `iterations` round trips.
    #[must_use]
    pub fn new(
        access: Arc<dyn PinAccess>,
        pins: PinMap,
        iterations: u64,
        yield_cpu: bool,
        epoch: Arc<RunEpoch>,
        clock: Arc<dyn Clock>,
        results: Arc<ResultBoard>,
    ) -> Self {
        Self {
            access,
            pins,
            iterations,
            yield_cpu,
            epoch,
            clock,
            results,
        }
    }

    /// Create both workers, parked. Start them with [`Worker::start`].
    ///
    /// # Errors
    ///
    /// Returns [`gpiobench_common::BenchError::WorkerCreation`] if either
    /// thread cannot be spawned; a worker already created is stopped and
    /// joined when it is dropped.
    pub fn spawn(
        &self,
        cores: Option<CoreMap>,
        realtime: &RealtimeConfig,
    ) -> BenchResult<(Worker, Worker)> {
        let worker_a = Worker::spawn(WORKER_A, self.clone().routine_a())?;
        let worker_b = Worker::spawn(WORKER_B, self.clone().routine_b(worker_a.stop_handle()))?;

        if let Some(cores) = cores {
            worker_a.bind_to_core(cores.worker_a);
            worker_b.bind_to_core(cores.worker_b);
        }
        if realtime.policy != SchedPolicy::Other {
            worker_a.set_scheduler(realtime.policy, realtime.priority);
            worker_b.set_scheduler(realtime.policy, realtime.priority);
        }

        info!(
            iterations = self.iterations,
            yield_cpu = self.yield_cpu,
            ?cores,
            "polling workers created"
        );
        Ok((worker_a, worker_b))
    }

    fn routine_a(self) -> impl FnOnce(&StopHandle) + Send + 'static {
        move |stop| {
            let access = self.access.as_ref();
            while !stop.should_stop() {
                if !wait_low(access, self.pins.in_a, stop, self.yield_cpu) {
                    break;
                }
                access.set(self.pins.out_a);
                access.clear(self.pins.out_b);
            }
        }
    }

    fn routine_b(self, stop_a: StopHandle) -> impl FnOnce(&StopHandle) + Send + 'static {
        move |stop| {
            let access = self.access.as_ref();
            let mut counter = RateCounter::new();

            for _ in 0..self.iterations {
                if !wait_low(access, self.pins.in_b, stop, self.yield_cpu) {
                    warn!(
                        completed = counter.iterations(),
                        "polling read-write cancelled; no rate reported"
                    );
                    return;
                }
                access.set(self.pins.out_b);
                access.clear(self.pins.out_a);
                counter.add_iterations(1);
            }

            counter.add_elapsed(self.clock.elapsed(self.epoch.base()));
            self.results.publish(counter.report(Scenario::PollingReadWrite));
            stop_a.signal();
        }
    }
}
