//! Benchmark orchestration: validate, acquire, launch, report, tear down.
//!
//! Setup order:
//! 1. validate the configuration (in [`BenchmarkOrchestrator::new`])
//! 2. lock memory if requested
//! 3. map the registers or prepare API access
//! 4. configure the ping-pong pins and, with a write-only run, `OutC`
//! 5. run the inline write-only benchmark
//! 6. bind the interrupt handlers or start the polling workers
//! 7. start the threaded write-only worker
//! 8. record the base timestamp and clear `OutA`
//!
//! Any failure after step 2 tears down whatever was acquired before the
//! error is returned.

use crate::realtime;
use crate::sync::{InterruptChain, PollLoop, RunEpoch};
use crate::worker::Worker;
use crate::write_only::WriteOnlyBenchmark;
use crossbeam_utils::sync::WaitGroup;
use gpiobench_common::{
    AccessConfig, BenchConfig, BenchPlan, BenchReport, BenchResult, PinMap, PinRole, ResultBoard,
    RunState, RunStateMachine, SyncStrategyKind, WriteOnlyMode,
};
use gpiobench_gpio::{GpioHost, InterruptBinding, PinAccess};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Drives one benchmark run from configuration to teardown.
#[derive(Debug)]
pub struct BenchmarkOrchestrator {
    plan: BenchPlan,
    access_config: AccessConfig,
    host: GpioHost,
    state: RunStateMachine,
    results: Arc<ResultBoard>,
    epoch: Arc<RunEpoch>,
    access: Option<Arc<dyn PinAccess>>,
    chain: Option<Arc<InterruptChain>>,
    bindings: Vec<InterruptBinding>,
    workers: Vec<Worker>,
}

impl BenchmarkOrchestrator {
    /// Validate `config` and prepare a run on `host`. Nothing is acquired.
    ///
    /// # Errors
    ///
    /// Returns [`gpiobench_common::BenchError::ConfigurationConflict`] or
    /// [`gpiobench_common::BenchError::InvalidConfig`] for a bad configuration.
    pub fn new(config: &BenchConfig, host: GpioHost) -> BenchResult<Self> {
        let plan = config.validate()?;

        if let Some(cores) = plan.affinity {
            let available = realtime::available_cores();
            for core in [cores.worker_a, cores.worker_b, cores.write_only] {
                if core >= available {
                    warn!(core, available, "configured core is not available");
                }
            }
        }

        info!(
            access = %plan.access,
            sync = ?plan.sync,
            write_only = ?plan.write_only,
            read_write_iterations = plan.read_write_iterations(),
            write_only_iterations = plan.counts.write_only,
            "benchmark configured"
        );

        Ok(Self {
            plan,
            access_config: config.access.clone(),
            host,
            state: RunStateMachine::new(),
            results: Arc::new(ResultBoard::new()),
            epoch: Arc::new(RunEpoch::new()),
            access: None,
            chain: None,
            bindings: Vec::new(),
            workers: Vec::new(),
        })
    }

    /// Acquire everything and launch the selected benchmarks.
    ///
    /// Returns once the ping-pong has been kicked off; only the inline
    /// write-only benchmark runs on the caller's thread.
    ///
    /// # Errors
    ///
    /// Returns the first acquisition error. Everything acquired before it has
    /// already been released and the orchestrator is left FAILED.
    pub fn setup(&mut self) -> BenchResult<()> {
        self.state.transition(RunState::Configuring)?;

        match self.launch() {
            Ok(()) => {
                self.state.transition(RunState::Running)?;
                info!("benchmarks running");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "benchmark setup failed");
                self.teardown();
                self.state.transition(RunState::Failed)?;
                Err(e)
            }
        }
    }

    fn launch(&mut self) -> BenchResult<()> {
        if self.plan.realtime.lock_memory {
            realtime::lock_memory();
        }

        let access = self.host.open_access(self.plan.access, &self.access_config)?;
        self.access = Some(Arc::clone(&access));

        let pins = self.plan.pins;
        let roles: &[PinRole] = if self.plan.write_only == WriteOnlyMode::Disabled {
            &PinMap::READ_WRITE_ROLES
        } else {
            &PinMap::ALL_ROLES
        };
        for &role in roles {
            let pin = pins.pin(role);
            access.configure(pin, role.mode()).map_err(|e| {
                error!(%role, pin = pin.number(), error = %e, "pin setup failed");
                e
            })?;
        }
        info!(count = roles.len(), access = %self.plan.access, "GPIO pins configured");

        if self.plan.write_only == WriteOnlyMode::Inline {
            self.results.publish(self.write_only_benchmark(&access).run());
        }

        let ready = WaitGroup::new();
        let iterations = self.plan.read_write_iterations();
        match self.plan.sync {
            SyncStrategyKind::InterruptChain => {
                let chain = InterruptChain::new(
                    Arc::clone(&access),
                    pins,
                    iterations,
                    Arc::clone(&self.epoch),
                    Arc::clone(&self.host.clock),
                    Arc::clone(&self.results),
                );
                self.bindings = chain.bind(self.host.interrupts.as_ref())?;
                self.chain = Some(chain);
            }
            SyncStrategyKind::PollLoop { yield_cpu } => {
                let poll = PollLoop::new(
                    Arc::clone(&access),
                    pins,
                    iterations,
                    yield_cpu,
                    Arc::clone(&self.epoch),
                    Arc::clone(&self.host.clock),
                    Arc::clone(&self.results),
                );
                let (a, b) = poll.spawn(self.plan.affinity, &self.plan.realtime)?;
                a.start(ready.clone());
                b.start(ready.clone());
                self.workers.push(a);
                self.workers.push(b);
            }
        }

        if self.plan.write_only == WriteOnlyMode::Threaded {
            let worker = self.write_only_benchmark(&access).spawn(
                self.plan.affinity.map(|c| c.write_only),
                &self.plan.realtime,
                Arc::clone(&self.results),
            )?;
            worker.start(ready.clone());
            self.workers.push(worker);
        }

        ready.wait();
        debug!(workers = self.workers.len(), "all workers running");

        self.epoch.mark(self.host.clock.now());
        access.clear(pins.out_a);
        info!(iterations, "read-write test kicked off");
        Ok(())
    }

    fn write_only_benchmark(&self, access: &Arc<dyn PinAccess>) -> WriteOnlyBenchmark {
        WriteOnlyBenchmark::new(
            Arc::clone(access),
            self.plan.pins.out_c,
            self.plan.counts.write_only,
            Arc::clone(&self.host.clock),
        )
    }

    /// Release everything held. Safe to call repeatedly.
    fn teardown(&mut self) {
        for worker in &self.workers {
            worker.signal_stop();
        }
        for worker in self.workers.drain(..) {
            let name = worker.name().to_string();
            if !worker.join() {
                warn!(worker = %name, "worker did not exit cleanly");
            }
        }

        for binding in self.bindings.drain(..) {
            binding.unbind();
        }
        self.chain = None;

        if let Some(access) = self.access.take() {
            access.release();
            if Arc::strong_count(&access) > 1 {
                warn!("pin access still referenced after teardown");
            }
        }
    }

    /// Stop every worker, unbind interrupts and release all pins.
    ///
    /// Idempotent; also valid after a failed setup or without any setup.
    pub fn shutdown(&mut self) {
        if self.state.state() == RunState::Stopped {
            return;
        }
        self.teardown();
        if let Err(e) = self.state.transition(RunState::Stopped) {
            warn!(error = %e, "unexpected state at shutdown");
            return;
        }
        info!(reports = self.results.len(), "benchmark harness stopped");
    }

    /// Whether every selected benchmark has reported.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.results.len() >= self.plan.expected_reports()
    }

    /// Reports published so far.
    #[must_use]
    pub fn results(&self) -> Vec<BenchReport> {
        self.results.reports()
    }

    /// Shared result board.
    #[must_use]
    pub fn result_board(&self) -> Arc<ResultBoard> {
        Arc::clone(&self.results)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state.state()
    }

    /// The validated plan this run follows.
    #[must_use]
    pub fn plan(&self) -> &BenchPlan {
        &self.plan
    }
}

impl Drop for BenchmarkOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
