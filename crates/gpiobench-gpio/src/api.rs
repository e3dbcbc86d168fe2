//! Pin access through the host's generic GPIO API.

use crate::PinAccess;
use gpiobench_common::{AccessKind, BenchError, BenchResult, PinId, PinMode};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info};

/// A claimed line, resolved once so toggling it needs no lookup.
pub trait PinLine: Send + Sync + fmt::Debug {
    /// Current level.
    fn get(&self) -> bool;

    /// Drive the line.
    fn set(&self, high: bool);
}

/// Host pin capability: ownership and direction of individual lines.
pub trait PinPlatform: Send + Sync + fmt::Debug {
    /// Take exclusive ownership of `pin` and return its line handle.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::PinAcquisition`] if the pin is owned elsewhere
    /// or does not exist.
    fn claim_pin(&self, pin: PinId) -> BenchResult<Arc<dyn PinLine>>;

    /// Give `pin` back to the host. Handles still held for it keep working
    /// until they are dropped.
    fn release_pin(&self, pin: PinId);

    /// Set the direction of a claimed pin. Outputs start driven high.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::PinConfiguration`] if the host rejects the
    /// direction.
    fn set_direction(&self, pin: PinId, mode: PinMode) -> BenchResult<()>;
}

/// Line handles indexed by pin number.
type LineTable = Box<[Option<Arc<dyn PinLine>>]>;

/// [`PinAccess`] that goes through a [`PinPlatform`].
///
/// Every pin passed to `configure` is claimed first and remembered, so
/// [`release`](PinAccess::release) hands back exactly the pins this value
/// claimed, even when a later pin failed.
///
/// The first `read`, `set` or `clear` freezes the claimed handles into a
/// table indexed by pin number; from then on a toggle is an index and a call
/// into the line, and `configure` is refused.
pub struct ApiAccess {
    platform: Arc<dyn PinPlatform>,
    claimed: Mutex<Vec<(PinId, Arc<dyn PinLine>)>>,
    table: OnceLock<LineTable>,
}

impl ApiAccess {
    /// Access through `platform`; nothing is claimed yet.
    #[must_use]
    pub fn new(platform: Arc<dyn PinPlatform>) -> Self {
        Self {
            platform,
            claimed: Mutex::new(Vec::new()),
            table: OnceLock::new(),
        }
    }

    /// Pins currently held.
    #[must_use]
    pub fn claimed(&self) -> Vec<PinId> {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(pin, _)| *pin)
            .collect()
    }

    fn seal(&self) -> LineTable {
        let claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        let len = claimed
            .iter()
            .map(|(pin, _)| pin.number() as usize + 1)
            .max()
            .unwrap_or(0);
        let mut table: Vec<Option<Arc<dyn PinLine>>> = vec![None; len];
        for (pin, line) in claimed.iter() {
            table[pin.number() as usize] = Some(Arc::clone(line));
        }
        debug!(lines = claimed.len(), "pin table sealed");
        table.into_boxed_slice()
    }

    /// Handle for `pin`; `None` when it was never configured.
    #[inline]
    fn line(&self, pin: PinId) -> Option<&dyn PinLine> {
        self.table
            .get_or_init(|| self.seal())
            .get(pin.number() as usize)
            .and_then(Option::as_deref)
    }
}

impl fmt::Debug for ApiAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiAccess")
            .field("platform", &self.platform)
            .field("claimed", &self.claimed())
            .field("sealed", &self.table.get().is_some())
            .finish()
    }
}

impl PinAccess for ApiAccess {
    fn kind(&self) -> AccessKind {
        AccessKind::Api
    }

    fn configure(&self, pin: PinId, mode: PinMode) -> BenchResult<()> {
        if self.table.get().is_some() {
            return Err(BenchError::PinConfiguration {
                pin: pin.number(),
                reason: "pins already in use".into(),
            });
        }

        let line = self.platform.claim_pin(pin)?;
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((pin, line));

        self.platform.set_direction(pin, mode)?;
        debug!(pin = pin.number(), %mode, "pin claimed");
        Ok(())
    }

    #[inline]
    fn read(&self, pin: PinId) -> bool {
        self.line(pin).is_some_and(|line| line.get())
    }

    #[inline]
    fn set(&self, pin: PinId) {
        if let Some(line) = self.line(pin) {
            line.set(true);
        }
    }

    #[inline]
    fn clear(&self, pin: PinId) {
        if let Some(line) = self.line(pin) {
            line.set(false);
        }
    }

    fn release(&self) {
        let pins: Vec<PinId> = self
            .claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .map(|(pin, _)| pin)
            .collect();

        if pins.is_empty() {
            return;
        }

        for pin in pins.iter().rev() {
            self.platform.release_pin(*pin);
        }
        info!(count = pins.len(), "GPIO pins released");
    }
}

impl Drop for ApiAccess {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type CallLog = Arc<Mutex<Vec<String>>>;

    /// Records every platform and line call.
    #[derive(Debug, Default)]
    struct Recorder {
        calls: CallLog,
        refuse_direction: Option<PinId>,
    }

    #[derive(Debug)]
    struct RecordedLine {
        pin: PinId,
        calls: CallLog,
    }

    impl PinLine for RecordedLine {
        fn get(&self) -> bool {
            self.calls.lock().unwrap().push(format!("read {}", self.pin));
            true
        }

        fn set(&self, high: bool) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("write {}={high}", self.pin));
        }
    }

    impl PinPlatform for Recorder {
        fn claim_pin(&self, pin: PinId) -> BenchResult<Arc<dyn PinLine>> {
            self.calls.lock().unwrap().push(format!("claim {pin}"));
            Ok(Arc::new(RecordedLine {
                pin,
                calls: Arc::clone(&self.calls),
            }))
        }

        fn release_pin(&self, pin: PinId) {
            self.calls.lock().unwrap().push(format!("release {pin}"));
        }

        fn set_direction(&self, pin: PinId, mode: PinMode) -> BenchResult<()> {
            if self.refuse_direction == Some(pin) {
                return Err(BenchError::PinConfiguration {
                    pin: pin.number(),
                    reason: "refused".into(),
                });
            }
            self.calls.lock().unwrap().push(format!("{mode} {pin}"));
            Ok(())
        }
    }

    #[test]
    fn test_configure_claims_then_sets_direction() {
        let platform = Arc::new(Recorder::default());
        let access = ApiAccess::new(platform.clone());

        access.configure(PinId(17), PinMode::Output).unwrap();
        access.set(PinId(17));
        access.clear(PinId(17));

        assert_eq!(
            *platform.calls.lock().unwrap(),
            vec!["claim 17", "output 17", "write 17=true", "write 17=false"]
        );
        assert_eq!(access.claimed(), vec![PinId(17)]);
    }

    #[test]
    fn test_toggles_go_straight_to_the_line() {
        let platform = Arc::new(Recorder::default());
        let access = ApiAccess::new(platform.clone());
        access.configure(PinId(18), PinMode::Input).unwrap();
        access.configure(PinId(17), PinMode::Output).unwrap();
        platform.calls.lock().unwrap().clear();

        for _ in 0..3 {
            assert!(access.read(PinId(18)));
            access.set(PinId(17));
        }
        // Unconfigured pins, inside and beyond the table, are inert.
        assert!(!access.read(PinId(5)));
        access.clear(PinId(40));

        let calls = platform.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 6);
        assert!(calls
            .iter()
            .all(|c| c == "read 18" || c == "write 17=true"));
    }

    #[test]
    fn test_configure_after_use_rejected() {
        let platform = Arc::new(Recorder::default());
        let access = ApiAccess::new(platform.clone());
        access.configure(PinId(17), PinMode::Output).unwrap();
        access.set(PinId(17));

        let err = access.configure(PinId(22), PinMode::Output).unwrap_err();
        assert!(matches!(err, BenchError::PinConfiguration { pin: 22, .. }));
        assert_eq!(access.claimed(), vec![PinId(17)]);
        assert!(!platform
            .calls
            .lock()
            .unwrap()
            .contains(&"claim 22".to_string()));
    }

    #[test]
    fn test_direction_failure_keeps_claim_for_release() {
        let platform = Arc::new(Recorder {
            refuse_direction: Some(PinId(18)),
            ..Recorder::default()
        });
        let access = ApiAccess::new(platform.clone());

        access.configure(PinId(17), PinMode::Output).unwrap();
        let err = access.configure(PinId(18), PinMode::Input).unwrap_err();
        assert!(matches!(err, BenchError::PinConfiguration { pin: 18, .. }));

        access.release();
        access.release();

        let calls = platform.calls.lock().unwrap().clone();
        let releases: Vec<_> = calls.iter().filter(|c| c.starts_with("release")).collect();
        assert_eq!(releases, vec!["release 18", "release 17"]);
    }

    #[test]
    fn test_drop_releases() {
        let platform = Arc::new(Recorder::default());
        {
            let access = ApiAccess::new(platform.clone());
            access.configure(PinId(22), PinMode::Output).unwrap();
        }
        assert!(platform
            .calls
            .lock()
            .unwrap()
            .contains(&"release 22".to_string()));
    }
}
