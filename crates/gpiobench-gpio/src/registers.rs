//! Direct register access to the BCM2836/7 GPIO block.
//!
//! Register indices are in 32-bit words from the start of the block:
//!
//! | index | register |
//! |---|---|
//! | 0..=5 | function select, ten pins per word, three bits each |
//! | 7, 8 | output set, one bit per pin |
//! | 10, 11 | output clear, one bit per pin |
//! | 13, 14 | pin level, one bit per pin |

use crate::PinAccess;
use gpiobench_common::{AccessKind, BenchResult, PinId, PinMode};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// First function-select register.
pub const GPFSEL0: usize = 0;
/// First output-set register.
pub const GPSET0: usize = 7;
/// First output-clear register.
pub const GPCLR0: usize = 10;
/// First pin-level register.
pub const GPLEV0: usize = 13;

/// Function-select mask for one pin.
const FSEL_MASK: u32 = 0b111;
/// Function-select value for output.
const FSEL_OUTPUT: u32 = 0b001;

/// Function-select register index and bit shift for `pin`.
#[inline]
#[must_use]
pub const fn fsel_slot(pin: u32) -> (usize, u32) {
    (GPFSEL0 + (pin / 10) as usize, (pin % 10) * 3)
}

/// Bank offset and bit mask for `pin` in the set, clear and level registers.
#[inline]
#[must_use]
pub const fn bank_bit(pin: u32) -> (usize, u32) {
    ((pin / 32) as usize, 1 << (pin % 32))
}

/// A mapped span of 32-bit GPIO registers.
///
/// Every call is a single whole-register volatile access.
pub trait RegisterBlock: Send + Sync + fmt::Debug {
    /// Read the register at word `index`.
    fn read(&self, index: usize) -> u32;

    /// Write `value` to the register at word `index`.
    fn write(&self, index: usize, value: u32);
}

/// Maps the physical register block into this process.
pub trait RegisterMapper: Send + Sync + fmt::Debug {
    /// Map `len` bytes starting at physical address `base`.
    ///
    /// The block is unmapped when the returned value is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`gpiobench_common::BenchError::ResourceMapping`] when the
    /// mapping is denied.
    fn map_register_block(&self, base: u64, len: usize) -> BenchResult<Box<dyn RegisterBlock>>;
}

/// [`PinAccess`] that manipulates the GPIO registers directly.
///
/// The register block is owned here and unmapped when the last reference to
/// this value is dropped, so workers still holding it never see a dangling
/// mapping.
#[derive(Debug)]
pub struct RegisterAccess {
    block: Box<dyn RegisterBlock>,
    released: AtomicBool,
}

impl RegisterAccess {
    /// Map the register block through `mapper`.
    ///
    /// # Errors
    ///
    /// Returns [`gpiobench_common::BenchError::ResourceMapping`] if the
    /// mapping is denied.
    pub fn map(mapper: &dyn RegisterMapper, base: u64, len: usize) -> BenchResult<Self> {
        let block = mapper.map_register_block(base, len)?;
        info!(base = format_args!("{base:#x}"), len, "GPIO registers mapped");
        Ok(Self::new(block))
    }

    /// Wrap an already mapped block.
    #[must_use]
    pub fn new(block: Box<dyn RegisterBlock>) -> Self {
        Self {
            block,
            released: AtomicBool::new(false),
        }
    }

    /// Whether [`PinAccess::release`] has been called.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl PinAccess for RegisterAccess {
    fn kind(&self) -> AccessKind {
        AccessKind::Registers
    }

    fn configure(&self, pin: PinId, mode: PinMode) -> BenchResult<()> {
        let (index, shift) = fsel_slot(pin.number());

        // Always pass through input before selecting output.
        let fsel = self.block.read(index) & !(FSEL_MASK << shift);
        self.block.write(index, fsel);

        if mode == PinMode::Output {
            self.block.write(index, fsel | (FSEL_OUTPUT << shift));
            self.set(pin);
        }

        debug!(pin = pin.number(), %mode, "pin function selected");
        Ok(())
    }

    #[inline]
    fn read(&self, pin: PinId) -> bool {
        let (bank, bit) = bank_bit(pin.number());
        self.block.read(GPLEV0 + bank) & bit != 0
    }

    #[inline]
    fn set(&self, pin: PinId) {
        let (bank, bit) = bank_bit(pin.number());
        self.block.write(GPSET0 + bank, bit);
    }

    #[inline]
    fn clear(&self, pin: PinId) {
        let (bank, bit) = bank_bit(pin.number());
        self.block.write(GPCLR0 + bank, bit);
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!("register access released; block unmaps with its last user");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    /// Plain memory standing in for the register file.
    #[derive(Debug, Default)]
    struct Scratch {
        words: [AtomicU32; 16],
        writes: Mutex<Vec<(usize, u32)>>,
    }

    impl RegisterBlock for std::sync::Arc<Scratch> {
        fn read(&self, index: usize) -> u32 {
            self.words[index].load(Ordering::SeqCst)
        }

        fn write(&self, index: usize, value: u32) {
            self.words[index].store(value, Ordering::SeqCst);
            self.writes.lock().unwrap().push((index, value));
        }
    }

    #[test]
    fn test_slot_arithmetic() {
        assert_eq!(fsel_slot(17), (1, 21));
        assert_eq!(fsel_slot(9), (0, 27));
        assert_eq!(fsel_slot(53), (5, 9));
        assert_eq!(bank_bit(17), (0, 1 << 17));
        assert_eq!(bank_bit(33), (1, 1 << 1));
    }

    #[test]
    fn test_configure_output_clears_then_selects() {
        let scratch = std::sync::Arc::new(Scratch::default());
        scratch.words[1].store(0b111 << 21 | 0b100, Ordering::SeqCst);
        let access = RegisterAccess::new(Box::new(scratch.clone()));

        access.configure(PinId(17), PinMode::Output).unwrap();

        let writes = scratch.writes.lock().unwrap().clone();
        assert_eq!(
            writes,
            vec![
                (1, 0b100),
                (1, 0b001 << 21 | 0b100),
                (GPSET0, 1 << 17),
            ]
        );
    }

    #[test]
    fn test_configure_input_only_clears() {
        let scratch = std::sync::Arc::new(Scratch::default());
        scratch.words[1].store(0b001 << 24, Ordering::SeqCst);
        let access = RegisterAccess::new(Box::new(scratch.clone()));

        access.configure(PinId(18), PinMode::Input).unwrap();

        assert_eq!(scratch.words[1].load(Ordering::SeqCst), 0);
        assert_eq!(scratch.writes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_set_clear_write_whole_registers() {
        let scratch = std::sync::Arc::new(Scratch::default());
        let access = RegisterAccess::new(Box::new(scratch.clone()));

        access.set(PinId(22));
        access.clear(PinId(22));

        let writes = scratch.writes.lock().unwrap().clone();
        assert_eq!(writes, vec![(GPSET0, 1 << 22), (GPCLR0, 1 << 22)]);
    }

    #[test]
    fn test_read_tests_level_bit() {
        let scratch = std::sync::Arc::new(Scratch::default());
        scratch.words[GPLEV0].store(1 << 24, Ordering::SeqCst);
        let access = RegisterAccess::new(Box::new(scratch));

        assert!(access.read(PinId(24)));
        assert!(!access.read(PinId(23)));
    }

    #[test]
    fn test_release_is_idempotent() {
        let access = RegisterAccess::new(Box::new(std::sync::Arc::new(Scratch::default())));
        access.release();
        access.release();
        assert!(access.is_released());
    }
}
