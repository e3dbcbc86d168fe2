//! Edge interrupt bindings.

use gpiobench_common::{BenchResult, PinId};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which transitions trigger a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// High to low.
    Falling,
    /// Low to high.
    Rising,
    /// Either direction.
    Both,
}

impl EdgeKind {
    /// Whether a transition to `level` triggers this edge.
    #[inline]
    #[must_use]
    pub const fn matches(self, level: bool) -> bool {
        match self {
            Self::Falling => !level,
            Self::Rising => level,
            Self::Both => true,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Falling => write!(f, "falling"),
            Self::Rising => write!(f, "rising"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Callback invoked from an interrupt dispatcher thread.
pub type IrqHandler = Arc<dyn Fn() + Send + Sync>;

/// Host facility that attaches handlers to a pin's edge interrupt.
pub trait InterruptController: Send + Sync + fmt::Debug {
    /// Run `handler` on every `edge` transition of `pin` until the returned
    /// binding is unbound or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`gpiobench_common::BenchError::InterruptBinding`] when the
    /// interrupt line cannot be obtained.
    fn bind_interrupt(
        &self,
        pin: PinId,
        edge: EdgeKind,
        handler: IrqHandler,
    ) -> BenchResult<InterruptBinding>;
}

/// A live handler registration. Detaches on [`unbind`](Self::unbind) or drop.
pub struct InterruptBinding {
    pin: PinId,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl InterruptBinding {
    /// Binding for `pin` that runs `detach` once when released.
    ///
    /// `detach` must not return until the handler can no longer run.
    pub fn new(pin: PinId, detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            pin,
            detach: Some(Box::new(detach)),
        }
    }

    /// Pin this binding is attached to.
    #[must_use]
    pub fn pin(&self) -> PinId {
        self.pin
    }

    /// Detach the handler, waiting for a running invocation to finish.
    pub fn unbind(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
            debug!(pin = self.pin.number(), "interrupt handler unbound");
        }
    }
}

impl fmt::Debug for InterruptBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptBinding")
            .field("pin", &self.pin)
            .field("bound", &self.detach.is_some())
            .finish()
    }
}

impl Drop for InterruptBinding {
    fn drop(&mut self) {
        self.detach_now();
    }
}
