//! Read-write ping-pong synchronization strategies.
//!
//! Both strategies bounce a single low pulse around the loop
//! `OutA -> InA -> OutB -> InB -> OutA`. Each hop is one write observed as
//! one input transition; the run is kicked off by clearing `OutA` once.

pub mod interrupt_chain;
pub mod poll_loop;

pub use interrupt_chain::InterruptChain;
pub use poll_loop::PollLoop;

use gpiobench_common::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Base timestamp of a ping-pong run, recorded just before the kick.
#[derive(Debug, Default)]
pub struct RunEpoch {
    base: AtomicU64,
}

impl RunEpoch {
    /// Epoch at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `at` as the start of the run.
    pub fn mark(&self, at: Timestamp) {
        self.base.store(at.ticks(), Ordering::Release);
    }

    /// Start of the run.
    #[must_use]
    pub fn base(&self) -> Timestamp {
        Timestamp(self.base.load(Ordering::Acquire))
    }
}
