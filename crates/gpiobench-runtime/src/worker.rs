//! Cooperative benchmark workers.
//!
//! A [`Worker`] is a named OS thread created in a parked state: it can be
//! pinned to a core and given a scheduler policy before [`Worker::start`]
//! releases it. Workers stop cooperatively by polling their [`StopHandle`].

use crossbeam_utils::sync::{Parker, Unparker, WaitGroup};
use gpiobench_common::{BenchError, BenchResult, SchedPolicy};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use crate::realtime;

#[derive(Debug, Default)]
struct StopSignal {
    requested: AtomicBool,
    signals: AtomicU32,
}

/// Shared handle through which a worker is asked to stop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<StopSignal>);

impl StopHandle {
    /// A fresh, unsignalled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop.
    pub fn signal(&self) {
        self.0.signals.fetch_add(1, Ordering::AcqRel);
        self.0.requested.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    #[inline]
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.0.requested.load(Ordering::Acquire)
    }

    /// How many times [`signal`](Self::signal) has been called.
    #[must_use]
    pub fn signal_count(&self) -> u32 {
        self.0.signals.load(Ordering::Acquire)
    }
}

/// Placement applied by the worker thread to itself before running.
#[derive(Debug, Default)]
struct Launch {
    started: AtomicBool,
    core: Mutex<Option<usize>>,
    scheduler: Mutex<Option<(SchedPolicy, u8)>>,
    ready: Mutex<Option<WaitGroup>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A named, parked-until-started benchmark thread.
#[derive(Debug)]
pub struct Worker {
    name: String,
    stop: StopHandle,
    launch: Arc<Launch>,
    gate: Unparker,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Create the thread for `entry`. It does not run until [`start`](Self::start).
    ///
    /// `entry` receives the worker's own stop handle.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::WorkerCreation`] if the thread cannot be spawned.
    pub fn spawn<F>(name: impl Into<String>, entry: F) -> BenchResult<Self>
    where
        F: FnOnce(&StopHandle) + Send + 'static,
    {
        let name = name.into();
        let stop = StopHandle::new();
        let launch = Arc::new(Launch::default());
        let parker = Parker::new();
        let gate = parker.unparker().clone();

        let handle = {
            let stop = stop.clone();
            let launch = Arc::clone(&launch);
            let thread_name = name.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    while !launch.started.load(Ordering::Acquire) {
                        if stop.should_stop() {
                            debug!(worker = %thread_name, "stopped before start");
                            return;
                        }
                        parker.park();
                    }

                    if let Some(core) = *lock(&launch.core) {
                        realtime::pin_current_thread(core);
                    }
                    if let Some((policy, priority)) = *lock(&launch.scheduler) {
                        realtime::set_scheduler(policy, priority);
                    }

                    debug!(worker = %thread_name, "worker running");
                    drop(lock(&launch.ready).take());
                    entry(&stop);
                    debug!(worker = %thread_name, "worker finished");
                })
                .map_err(|e| BenchError::WorkerCreation {
                    name: name.clone(),
                    reason: e.to_string(),
                })?
        };

        Ok(Self {
            name,
            stop,
            launch,
            gate,
            handle: Some(handle),
        })
    }

    /// Worker name, also used as the thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run on `core` once started.
    pub fn bind_to_core(&self, core: usize) {
        *lock(&self.launch.core) = Some(core);
    }

    /// Run under `policy` at `priority` once started.
    pub fn set_scheduler(&self, policy: SchedPolicy, priority: u8) {
        *lock(&self.launch.scheduler) = Some((policy, priority));
    }

    /// Release the worker. `ready` is dropped once the thread has applied its
    /// placement and is about to run its routine.
    pub fn start(&self, ready: WaitGroup) {
        if self.stop.should_stop() || self.handle.is_none() {
            return;
        }
        *lock(&self.launch.ready) = Some(ready);
        self.launch.started.store(true, Ordering::Release);
        self.gate.unpark();
        debug!(worker = %self.name, "worker started");
    }

    /// Handle other workers can use to stop this one.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Ask the worker to stop.
    pub fn signal_stop(&self) {
        self.stop.signal();
        self.gate.unpark();
    }

    /// Whether the thread has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the thread to exit. Returns `false` if it panicked.
    pub fn join(mut self) -> bool {
        self.join_inner()
    }

    fn join_inner(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        if !self.launch.started.load(Ordering::Acquire) {
            self.signal_stop();
        }
        match handle.join() {
            Ok(()) => true,
            Err(e) => {
                warn!(worker = %self.name, "worker panicked: {:?}", e);
                false
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.signal_stop();
            self.join_inner();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_does_not_run_before_start() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let worker = Worker::spawn("gated", move |_| flag.store(true, Ordering::SeqCst)).unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(!ran.load(Ordering::SeqCst));

        let ready = WaitGroup::new();
        worker.start(ready.clone());
        ready.wait();
        assert!(worker.join());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_before_start_skips_entry() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let worker = Worker::spawn("skipped", move |_| flag.store(true, Ordering::SeqCst)).unwrap();

        worker.signal_stop();
        assert!(worker.join());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cooperative_stop() {
        let spins = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&spins);
        let worker = Worker::spawn("spinner", move |stop| {
            while !stop.should_stop() {
                counter.fetch_add(1, Ordering::Relaxed);
                thread::yield_now();
            }
        })
        .unwrap();

        let ready = WaitGroup::new();
        worker.start(ready.clone());
        ready.wait();

        let handle = worker.stop_handle();
        handle.signal();
        assert!(worker.join());
        assert_eq!(handle.signal_count(), 1);
    }

    #[test]
    fn test_thread_is_named() {
        let name = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&name);
        let worker = Worker::spawn("rw_thread_a", move |_| {
            *slot.lock().unwrap() = thread::current().name().map(String::from);
        })
        .unwrap();
        assert_eq!(worker.name(), "rw_thread_a");

        let ready = WaitGroup::new();
        worker.start(ready.clone());
        ready.wait();
        worker.join();
        assert_eq!(name.lock().unwrap().as_deref(), Some("rw_thread_a"));
    }

    #[test]
    fn test_drop_joins() {
        let worker = Worker::spawn("dropped", |stop| {
            while !stop.should_stop() {
                thread::yield_now();
            }
        })
        .unwrap();
        worker.start(WaitGroup::new());
        drop(worker);
    }

    #[test]
    fn test_panicking_worker_reports() {
        let worker = Worker::spawn("panics", |_| panic!("boom")).unwrap();
        worker.start(WaitGroup::new());
        assert!(!worker.join());
    }
}
