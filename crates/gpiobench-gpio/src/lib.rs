//! GPIO access layer for the benchmark harness.
//!
//! This crate provides:
//! - [`PinAccess`] trait for reading, writing and configuring single pins
//! - [`registers`] module with direct memory-mapped register access
//! - [`api`] module with access through a host pin API
//! - [`interrupt`] module with edge interrupt bindings
//! - [`host`] module bundling the platform capabilities a run needs
//! - `sim` module with a loopback-wired simulated board (feature `simulated`)

pub mod api;
pub mod host;
pub mod interrupt;
pub mod registers;

#[cfg(target_os = "linux")]
pub mod chardev;
#[cfg(target_os = "linux")]
pub mod devmem;

#[cfg(feature = "simulated")]
pub mod sim;

pub use api::*;
pub use host::*;
pub use interrupt::*;
pub use registers::*;

use gpiobench_common::{AccessKind, BenchResult, PinId, PinMode};
use std::fmt;

/// Single-pin access used by every benchmark.
///
/// `read`, `set` and `clear` sit on the hot path and never fail; anything
/// that can go wrong is detected by `configure`.
pub trait PinAccess: Send + Sync + fmt::Debug {
    /// Which strategy this is.
    fn kind(&self) -> AccessKind;

    /// Put `pin` into `mode`. Outputs start driven high.
    ///
    /// # Errors
    ///
    /// Returns [`gpiobench_common::BenchError::PinAcquisition`] or
    /// [`gpiobench_common::BenchError::PinConfiguration`] when the host
    /// refuses the pin.
    fn configure(&self, pin: PinId, mode: PinMode) -> BenchResult<()>;

    /// Current level of `pin`.
    fn read(&self, pin: PinId) -> bool;

    /// Drive `pin` high.
    fn set(&self, pin: PinId);

    /// Drive `pin` low.
    fn clear(&self, pin: PinId);

    /// Give back everything acquired by `configure`. Idempotent.
    fn release(&self);
}
