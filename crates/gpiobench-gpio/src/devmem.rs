//! Register block mapped from `/dev/mem` or `/dev/gpiomem`.

#![allow(unsafe_code)]

use crate::registers::{RegisterBlock, RegisterMapper};
use gpiobench_common::{BenchError, BenchResult};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::OpenOptions;
use std::num::NonZeroUsize;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::ptr::NonNull;
use tracing::{debug, warn};

/// Maps the GPIO registers through a memory device node.
#[derive(Debug, Clone)]
pub struct DevMemMapper {
    device: PathBuf,
}

impl DevMemMapper {
    /// Mapper reading from `device`.
    #[must_use]
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }

    /// `/dev/gpiomem` exposes only the GPIO block, starting at offset zero.
    fn file_offset(&self, base: u64) -> u64 {
        if self.device.file_name().is_some_and(|n| n == "gpiomem") {
            0
        } else {
            base
        }
    }
}

impl RegisterMapper for DevMemMapper {
    fn map_register_block(&self, base: u64, len: usize) -> BenchResult<Box<dyn RegisterBlock>> {
        let fail = |reason: String| BenchError::ResourceMapping { base, len, reason };

        let length = NonZeroUsize::new(len).ok_or_else(|| fail("empty mapping".into()))?;
        let offset = libc::off_t::try_from(self.file_offset(base))
            .map_err(|_| fail("base address out of range".into()))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&self.device)
            .map_err(|e| fail(format!("{}: {e}", self.device.display())))?;

        // SAFETY: a fresh shared mapping of a device node; no Rust object
        // aliases it and it is only touched through volatile accesses.
        let ptr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &file,
                offset,
            )
        }
        .map_err(|e| fail(format!("mmap failed: {e}")))?;

        debug!(device = %self.device.display(), offset, len, "register block mapped");

        Ok(Box::new(MappedRegisters {
            base: ptr.cast::<u32>(),
            len,
        }))
    }
}

/// Owned register mapping. Unmapped exactly once, on drop.
#[derive(Debug)]
pub struct MappedRegisters {
    base: NonNull<u32>,
    len: usize,
}

// SAFETY: the mapping is device memory accessed only through single volatile
// word reads and writes, which the hardware serializes.
unsafe impl Send for MappedRegisters {}
unsafe impl Sync for MappedRegisters {}

impl MappedRegisters {
    #[inline]
    fn words(&self) -> usize {
        self.len / std::mem::size_of::<u32>()
    }
}

impl RegisterBlock for MappedRegisters {
    #[inline]
    fn read(&self, index: usize) -> u32 {
        debug_assert!(index < self.words());
        if index >= self.words() {
            return 0;
        }
        // SAFETY: index is within the mapping checked above.
        unsafe {
            self.base.as_ptr().add(index).read_volatile()
        }
    }

    #[inline]
    fn write(&self, index: usize, value: u32) {
        debug_assert!(index < self.words());
        if index >= self.words() {
            return;
        }
        // SAFETY: index is within the mapping checked above.
        unsafe {
            self.base.as_ptr().add(index).write_volatile(value);
        }
    }
}

impl Drop for MappedRegisters {
    fn drop(&mut self) {
        // SAFETY: base and len describe the mapping created in
        // `map_register_block`, and drop runs once.
        let result = unsafe { munmap(self.base.cast(), self.len) };
        match result {
            Ok(()) => debug!(len = self.len, "register block unmapped"),
            Err(e) => warn!(error = %e, "munmap failed"),
        }
    }
}
