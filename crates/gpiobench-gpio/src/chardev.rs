//! Linux GPIO character device host, built on `gpiocdev`.
//!
//! Each claimed pin is a single-line request on the configured chip. The
//! claim hands out a [`ChardevLine`] sharing that request, so reads and
//! writes go straight to the line ioctl. Edge interrupts reuse the pin's
//! request when it is already claimed and request the line on their own
//! otherwise (register access never claims pins here).

use crate::api::{PinLine, PinPlatform};
use crate::interrupt::{EdgeKind, InterruptBinding, InterruptController, IrqHandler};
use gpiobench_common::{BenchError, BenchResult, PinId, PinMode};
use gpiocdev::line::{EdgeDetection, Value};
use gpiocdev::Request;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// GPIO chip accessed through `/dev/gpiochipN`.
#[derive(Debug)]
pub struct ChardevHost {
    chip: PathBuf,
    consumer: String,
    poll_interval: Duration,
    lines: RwLock<HashMap<PinId, Arc<Request>>>,
}

impl ChardevHost {
    /// Host for `chip`, labelling requested lines with `consumer`.
    ///
    /// Interrupt dispatchers wake every `poll_interval` to check for unbind.
    pub fn new(chip: impl Into<PathBuf>, consumer: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            chip: chip.into(),
            consumer: consumer.into(),
            poll_interval,
            lines: RwLock::new(HashMap::new()),
        }
    }

    fn line(&self, pin: PinId) -> Option<Arc<Request>> {
        self.lines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pin)
            .cloned()
    }
}

fn edge_detection(edge: EdgeKind) -> EdgeDetection {
    match edge {
        EdgeKind::Falling => EdgeDetection::FallingEdge,
        EdgeKind::Rising => EdgeDetection::RisingEdge,
        EdgeKind::Both => EdgeDetection::BothEdges,
    }
}

fn edge_matches(edge: EdgeKind, kind: gpiocdev::line::EdgeKind) -> bool {
    match kind {
        gpiocdev::line::EdgeKind::Falling => edge.matches(false),
        gpiocdev::line::EdgeKind::Rising => edge.matches(true),
    }
}

/// A claimed line. The kernel request closes once the host has released the
/// pin and the last handle is dropped.
#[derive(Debug)]
pub struct ChardevLine {
    request: Arc<Request>,
    offset: u32,
}

impl PinLine for ChardevLine {
    fn get(&self) -> bool {
        self.request
            .value(self.offset)
            .is_ok_and(|v| v == Value::Active)
    }

    fn set(&self, high: bool) {
        let value = if high { Value::Active } else { Value::Inactive };
        if let Err(e) = self.request.set_value(self.offset, value) {
            trace!(pin = self.offset, error = %e, "set_value failed");
        }
    }
}

impl PinPlatform for ChardevHost {
    fn claim_pin(&self, pin: PinId) -> BenchResult<Arc<dyn PinLine>> {
        let mut lines = self.lines.write().unwrap_or_else(PoisonError::into_inner);
        if lines.contains_key(&pin) {
            return Err(BenchError::PinAcquisition {
                pin: pin.number(),
                reason: "already claimed".into(),
            });
        }

        let request = Request::builder()
            .on_chip(&self.chip)
            .with_consumer(self.consumer.as_str())
            .with_line(pin.number())
            .as_input()
            .request()
            .map_err(|e| BenchError::PinAcquisition {
                pin: pin.number(),
                reason: e.to_string(),
            })?;

        let request = Arc::new(request);
        lines.insert(pin, Arc::clone(&request));
        debug!(pin = pin.number(), chip = %self.chip.display(), "line requested");
        Ok(Arc::new(ChardevLine {
            request,
            offset: pin.number(),
        }))
    }

    fn release_pin(&self, pin: PinId) {
        let removed = self
            .lines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pin);
        if removed.is_some() {
            debug!(pin = pin.number(), "line released");
        }
    }

    fn set_direction(&self, pin: PinId, mode: PinMode) -> BenchResult<()> {
        let fail = |reason: String| BenchError::PinConfiguration {
            pin: pin.number(),
            reason,
        };
        let request = self.line(pin).ok_or_else(|| fail("not claimed".into()))?;

        let mut config = request.config();
        config.with_line(pin.number());
        match mode {
            PinMode::Input => config.as_input(),
            PinMode::Output => config.as_output(Value::Active),
        };
        request
            .reconfigure(&config)
            .map_err(|e| fail(e.to_string()))
    }
}

impl InterruptController for ChardevHost {
    fn bind_interrupt(
        &self,
        pin: PinId,
        edge: EdgeKind,
        handler: IrqHandler,
    ) -> BenchResult<InterruptBinding> {
        let fail = |reason: String| BenchError::InterruptBinding {
            pin: pin.number(),
            reason,
        };

        let (request, owned) = match self.line(pin) {
            Some(request) => {
                let mut config = request.config();
                config
                    .with_line(pin.number())
                    .as_input()
                    .with_edge_detection(edge_detection(edge));
                request
                    .reconfigure(&config)
                    .map_err(|e| fail(e.to_string()))?;
                (request, false)
            }
            None => {
                let request = Request::builder()
                    .on_chip(&self.chip)
                    .with_consumer(self.consumer.as_str())
                    .with_line(pin.number())
                    .as_input()
                    .with_edge_detection(edge_detection(edge))
                    .request()
                    .map_err(|e| fail(e.to_string()))?;
                (Arc::new(request), true)
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let dispatcher = {
            let request = Arc::clone(&request);
            let stop = Arc::clone(&stop);
            let poll_interval = self.poll_interval;
            thread::Builder::new()
                .name(format!("irq-gpio{}", pin.number()))
                .spawn(move || dispatch(&request, pin, edge, &handler, &stop, poll_interval))
                .map_err(|e| fail(format!("dispatcher thread: {e}")))?
        };

        debug!(pin = pin.number(), %edge, owned, "edge interrupt bound");

        Ok(InterruptBinding::new(pin, move || {
            stop.store(true, Ordering::Release);
            if dispatcher.join().is_err() {
                warn!(pin = pin.number(), "interrupt dispatcher panicked");
            }
            if !owned {
                let mut config = request.config();
                config.with_line(pin.number()).with_edge_detection(None);
                if let Err(e) = request.reconfigure(&config) {
                    warn!(pin = pin.number(), error = %e, "failed to disable edge detection");
                }
            }
        }))
    }
}

fn dispatch(
    request: &Request,
    pin: PinId,
    edge: EdgeKind,
    handler: &IrqHandler,
    stop: &AtomicBool,
    poll_interval: Duration,
) {
    while !stop.load(Ordering::Acquire) {
        match request.wait_edge_event(poll_interval) {
            Ok(true) => match request.read_edge_event() {
                Ok(event) if edge_matches(edge, event.kind) => handler(),
                Ok(_) => {}
                Err(e) => warn!(pin = pin.number(), error = %e, "failed to read edge event"),
            },
            Ok(false) => {}
            Err(e) => {
                error!(pin = pin.number(), error = %e, "edge event wait failed; dispatcher exiting");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_mapping() {
        assert_eq!(edge_detection(EdgeKind::Falling), EdgeDetection::FallingEdge);
        assert!(edge_matches(EdgeKind::Falling, gpiocdev::line::EdgeKind::Falling));
        assert!(!edge_matches(EdgeKind::Falling, gpiocdev::line::EdgeKind::Rising));
        assert!(edge_matches(EdgeKind::Both, gpiocdev::line::EdgeKind::Rising));
    }

    #[test]
    fn test_unclaimed_pin_cannot_be_directed() {
        let host = ChardevHost::new("/nonexistent/gpiochip9", "test", Duration::from_millis(10));
        assert!(host.set_direction(PinId(17), PinMode::Output).is_err());
        host.release_pin(PinId(17));
    }

    #[test]
    fn test_claim_on_missing_chip_fails() {
        let host = ChardevHost::new("/nonexistent/gpiochip9", "test", Duration::from_millis(10));
        let err = host.claim_pin(PinId(17)).unwrap_err();
        assert!(matches!(err, BenchError::PinAcquisition { pin: 17, .. }));
    }
}
