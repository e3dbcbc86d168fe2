//! Early-stop signals.
//!
//! SIGINT and SIGTERM record their number in a static; a watcher thread
//! turns that into a [`StopRequest`] the run loop polls. A ping-pong with a
//! missing loopback wire never completes and can only be ended this way.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Last signal delivered, 0 if none is pending.
static PENDING: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_signal(signo: libc::c_int) {
    PENDING.store(signo, Ordering::Relaxed);
}

/// Stop requests received so far.
#[derive(Debug, Default)]
pub struct StopRequest {
    received: AtomicU32,
}

impl StopRequest {
    /// Whether the run should end.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.received.load(Ordering::Relaxed) > 0
    }

    /// Number of requests, signals and manual ones alike.
    pub fn count(&self) -> u32 {
        self.received.load(Ordering::Relaxed)
    }

    fn record(&self, source: &str) {
        let n = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        info!(source, count = n, "stop requested");
    }
}

/// Installed SIGINT/SIGTERM handling.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    request: Arc<StopRequest>,
}

impl SignalHandler {
    /// Install handlers for SIGINT and SIGTERM and start the watcher.
    pub fn new() -> std::io::Result<Self> {
        use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

        let request = Arc::new(StopRequest::default());
        let watched = Arc::clone(&request);
        thread::Builder::new()
            .name("signal-watch".into())
            .spawn(move || {
                while !watched.is_set() {
                    match PENDING.swap(0, Ordering::Relaxed) {
                        0 => thread::sleep(Duration::from_millis(10)),
                        signo => {
                            let name = Signal::try_from(signo).map_or("unknown", Signal::as_str);
                            watched.record(name);
                        }
                    }
                }
            })?;

        let action = SigAction::new(
            SigHandler::Handler(on_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        for signal in [Signal::SIGINT, Signal::SIGTERM] {
            // SAFETY: on_signal only stores to an atomic.
            unsafe { sigaction(signal, &action) }.map_err(std::io::Error::from)?;
        }

        debug!("SIGINT and SIGTERM handlers installed");
        Ok(Self { request })
    }

    /// Whether the run should end.
    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.request.is_set()
    }

    /// Ask the run to end without a signal.
    #[cfg(test)]
    pub fn request_stop(&self) {
        self.request.record("manual");
    }

    /// The shared stop request.
    pub fn request(&self) -> &StopRequest {
        &self.request
    }
}

/// Poll until `done` holds or a stop is requested.
///
/// Returns `true` when a stop request ended the wait.
pub fn wait_until(handler: &SignalHandler, mut done: impl FnMut() -> bool) -> bool {
    const TICK: Duration = Duration::from_millis(50);
    loop {
        if handler.stop_requested() {
            return true;
        }
        if done() {
            return false;
        }
        thread::sleep(TICK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached() -> SignalHandler {
        SignalHandler {
            request: Arc::new(StopRequest::default()),
        }
    }

    #[test]
    fn test_fresh_request_is_clear() {
        let handler = detached();
        assert!(!handler.stop_requested());
        assert_eq!(handler.request().count(), 0);
    }

    #[test]
    fn test_manual_stop_counts() {
        let handler = detached();
        handler.request_stop();
        handler.request_stop();
        assert!(handler.stop_requested());
        assert_eq!(handler.request().count(), 2);
    }

    #[test]
    fn test_wait_ends_when_done() {
        let mut polls = 0;
        let stopped = wait_until(&detached(), || {
            polls += 1;
            polls == 3
        });
        assert!(!stopped);
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_wait_ends_on_stop() {
        let handler = detached();
        handler.request_stop();
        assert!(wait_until(&handler, || false));
    }
}
