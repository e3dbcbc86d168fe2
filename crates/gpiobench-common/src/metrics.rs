//! Rate accounting and benchmark result reporting.
//!
//! A [`RateCounter`] accumulates iterations and elapsed ticks for one
//! benchmark run; finished runs are published to a [`ResultBoard`] that the
//! orchestrator and its caller share.

use crate::time::rate;
use std::fmt;
use std::sync::Mutex;
use tracing::{info, warn};

/// Benchmark scenario a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Toggle a single output pin as fast as possible.
    WriteOnly,
    /// Read-write ping-pong driven by edge interrupts.
    InterruptReadWrite,
    /// Read-write ping-pong driven by polling workers.
    PollingReadWrite,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteOnly => write!(f, "write-only"),
            Self::InterruptReadWrite => write!(f, "IRQ-based read-write"),
            Self::PollingReadWrite => write!(f, "polling-based read-write"),
        }
    }
}

/// Iteration count and elapsed interval for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateCounter {
    iterations: u64,
    elapsed_ticks: u64,
}

impl RateCounter {
    /// Create an empty counter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            iterations: 0,
            elapsed_ticks: 0,
        }
    }

    /// Counter for a completed run.
    #[must_use]
    pub const fn with(iterations: u64, elapsed_ticks: u64) -> Self {
        Self {
            iterations,
            elapsed_ticks,
        }
    }

    /// Add completed iterations.
    #[inline]
    pub fn add_iterations(&mut self, n: u64) {
        self.iterations = self.iterations.saturating_add(n);
    }

    /// Add elapsed ticks.
    #[inline]
    pub fn add_elapsed(&mut self, ticks: u64) {
        self.elapsed_ticks = self.elapsed_ticks.saturating_add(ticks);
    }

    /// Iterations recorded so far.
    #[must_use]
    pub const fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Ticks recorded so far.
    #[must_use]
    pub const fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    /// Iterations per second, or `None` if no time has elapsed.
    #[must_use]
    pub fn hz(&self) -> Option<u64> {
        rate(self.iterations, self.elapsed_ticks)
    }

    /// Freeze the counter into a report for `scenario`.
    #[must_use]
    pub fn report(&self, scenario: Scenario) -> BenchReport {
        BenchReport {
            scenario,
            iterations: self.iterations,
            elapsed_ticks: self.elapsed_ticks,
            hz: self.hz(),
        }
    }
}

/// Result of one finished benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchReport {
    /// Which benchmark produced this report.
    pub scenario: Scenario,
    /// Completed iterations.
    pub iterations: u64,
    /// Elapsed time in 100 ns ticks.
    pub elapsed_ticks: u64,
    /// Iterations per second; `None` when no time elapsed.
    pub hz: Option<u64>,
}

impl BenchReport {
    /// Emit the report to the log sink.
    pub fn log(&self) {
        match self.hz {
            Some(hz) => info!(
                scenario = %self.scenario,
                iterations = self.iterations,
                elapsed_ticks = self.elapsed_ticks,
                hz,
                "{} test finished: {} iterations, {} Hz",
                self.scenario,
                self.iterations,
                hz
            ),
            None => warn!(
                scenario = %self.scenario,
                iterations = self.iterations,
                "{} test finished: {} iterations, rate undefined (no time elapsed)",
                self.scenario,
                self.iterations
            ),
        }
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hz {
            Some(hz) => write!(f, "{}: {} iterations, {} Hz", self.scenario, self.iterations, hz),
            None => write!(f, "{}: {} iterations, rate undefined", self.scenario, self.iterations),
        }
    }
}

/// Collects reports published by benchmarks running on any thread.
#[derive(Debug, Default)]
pub struct ResultBoard {
    reports: Mutex<Vec<BenchReport>>,
}

impl ResultBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `report` and keep it.
    pub fn publish(&self, report: BenchReport) {
        report.log();
        self.reports
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(report);
    }

    /// Copy of every report published so far.
    #[must_use]
    pub fn reports(&self) -> Vec<BenchReport> {
        self.reports
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of reports published so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been published yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First report for `scenario`, if published.
    #[must_use]
    pub fn find(&self, scenario: Scenario) -> Option<BenchReport> {
        self.reports
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|r| r.scenario == scenario)
            .copied()
    }
}
