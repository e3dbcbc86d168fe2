//! Platform capabilities a benchmark run is given.

use crate::api::{ApiAccess, PinPlatform};
use crate::interrupt::InterruptController;
use crate::registers::{RegisterAccess, RegisterMapper};
use crate::PinAccess;
use gpiobench_common::{AccessConfig, AccessKind, BenchResult, Clock};
use std::sync::Arc;

/// Bundle of host facilities: register mapping, pin ownership, edge
/// interrupts and a monotonic clock.
#[derive(Debug, Clone)]
pub struct GpioHost {
    /// Register block mapping.
    pub registers: Arc<dyn RegisterMapper>,
    /// Per-pin ownership and line handles.
    pub pins: Arc<dyn PinPlatform>,
    /// Edge interrupt registration.
    pub interrupts: Arc<dyn InterruptController>,
    /// Timestamp source.
    pub clock: Arc<dyn Clock>,
}

impl GpioHost {
    /// The real host: `/dev/mem` (or `/dev/gpiomem`) for registers and the
    /// GPIO character device for pins and interrupts.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn linux(config: &AccessConfig) -> Self {
        let chardev = Arc::new(crate::chardev::ChardevHost::new(
            &config.chip,
            config.consumer.as_str(),
            config.interrupt_poll_interval,
        ));
        Self {
            registers: Arc::new(crate::devmem::DevMemMapper::new(&config.register_device)),
            pins: chardev.clone(),
            interrupts: chardev,
            clock: Arc::new(gpiobench_common::MonotonicClock::new()),
        }
    }

    /// Create the pin access strategy `kind`.
    ///
    /// Register access maps the block here; API access claims nothing until
    /// pins are configured.
    ///
    /// # Errors
    ///
    /// Returns [`gpiobench_common::BenchError::ResourceMapping`] when the
    /// register block cannot be mapped.
    pub fn open_access(
        &self,
        kind: AccessKind,
        config: &AccessConfig,
    ) -> BenchResult<Arc<dyn PinAccess>> {
        let access: Arc<dyn PinAccess> = match kind {
            AccessKind::Registers => Arc::new(RegisterAccess::map(
                self.registers.as_ref(),
                config.register_base,
                config.register_span,
            )?),
            AccessKind::Api => Arc::new(ApiAccess::new(Arc::clone(&self.pins))),
        };
        Ok(access)
    }
}
