//! Ping-pong driven by edge interrupt handlers.
//!
//! Handler A runs on a falling `InA`, handler B on a falling `InB`. The only
//! state both touch is the iteration counter, which B advances with a single
//! conditional atomic increment so it lands exactly on the target.

use super::RunEpoch;
use crossbeam_utils::CachePadded;
use gpiobench_common::{BenchResult, Clock, PinMap, RateCounter, ResultBoard, Scenario};
use gpiobench_gpio::{EdgeKind, InterruptBinding, InterruptController, PinAccess};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Interrupt-driven read-write benchmark.
pub struct InterruptChain {
    access: Arc<dyn PinAccess>,
    pins: PinMap,
    target: u64,
    count: CachePadded<AtomicU64>,
    finished: AtomicBool,
    epoch: Arc<RunEpoch>,
    clock: Arc<dyn Clock>,
    results: Arc<ResultBoard>,
}

impl InterruptChain {
    /// Chain running `target` round trips.
    #[must_use]
    pub fn new(
        access: Arc<dyn PinAccess>,
        pins: PinMap,
        target: u64,
        epoch: Arc<RunEpoch>,
        clock: Arc<dyn Clock>,
        results: Arc<ResultBoard>,
    ) -> Arc<Self> {
        Arc::new(Self {
            access,
            pins,
            target,
            count: CachePadded::new(AtomicU64::new(0)),
            finished: AtomicBool::new(false),
            epoch,
            clock,
            results,
        })
    }

    /// Handler for a falling `InA`: hand the pulse on to pair B.
    #[inline]
    pub fn on_edge_a(&self) {
        self.access.set(self.pins.out_a);
        self.access.clear(self.pins.out_b);
    }

    /// Handler for a falling `InB`: count the round trip and hand the pulse
    /// back to pair A, or report once the target is reached.
    #[inline]
    pub fn on_edge_b(&self) {
        self.access.set(self.pins.out_b);

        let target = self.target;
        match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c < target).then_some(c + 1)
            }) {
            Ok(_) => self.access.clear(self.pins.out_a),
            Err(count) => self.finish(count),
        }
    }

    fn finish(&self, count: u64) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        let elapsed = self.clock.elapsed(self.epoch.base());
        self.results
            .publish(RateCounter::with(count, elapsed).report(Scenario::InterruptReadWrite));
    }

    /// Round trips completed so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Whether the result has been reported.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Attach both handlers.
    ///
    /// # Errors
    ///
    /// Returns [`gpiobench_common::BenchError::InterruptBinding`] if either
    /// line cannot be bound; a line already bound is unbound first.
    pub fn bind(self: &Arc<Self>, irq: &dyn InterruptController) -> BenchResult<Vec<InterruptBinding>> {
        let chain = Arc::clone(self);
        let a = irq
            .bind_interrupt(self.pins.in_a, EdgeKind::Falling, Arc::new(move || chain.on_edge_a()))
            .map_err(|e| {
                error!(pin = self.pins.in_a.number(), error = %e, "cannot bind IRQ handler A");
                e
            })?;

        let chain = Arc::clone(self);
        let b = match irq.bind_interrupt(
            self.pins.in_b,
            EdgeKind::Falling,
            Arc::new(move || chain.on_edge_b()),
        ) {
            Ok(b) => b,
            Err(e) => {
                error!(pin = self.pins.in_b.number(), error = %e, "cannot bind IRQ handler B");
                a.unbind();
                return Err(e);
            }
        };

        info!(
            in_a = self.pins.in_a.number(),
            in_b = self.pins.in_b.number(),
            target = self.target,
            "IRQ handlers bound"
        );
        Ok(vec![a, b])
    }
}

impl fmt::Debug for InterruptChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptChain")
            .field("pins", &self.pins)
            .field("target", &self.target)
            .field("count", &self.count())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
