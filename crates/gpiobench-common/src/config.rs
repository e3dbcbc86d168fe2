//! Configuration structures for the benchmark harness.
//!
//! The raw switches are deserialized from TOML. [`BenchConfig::validate`] turns them into a
//! [`BenchPlan`] in which mutually exclusive choices are tagged variants, so
//! conflicting switches are rejected before any resource is touched.

use crate::error::{BenchError, BenchResult};
use crate::pin::PinMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Physical base address of the BCM2836/7 GPIO register block.
pub const GPIO_BASE_ADDR: u64 = 0x3f20_0000;

/// Length of the register mapping in bytes.
pub const GPIO_MAP_LEN: usize = 16 * 1024;

/// Highest GPIO line number the register layout can address.
pub const MAX_REGISTER_PIN: u32 = 53;

/// Top-level benchmark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BenchConfig {
    /// Pin access strategy.
    pub access: AccessConfig,

    /// Read-write (ping-pong) benchmark switches.
    pub read_write: ReadWriteConfig,

    /// Write-only benchmark switches.
    pub write_only: WriteOnlyConfig,

    /// Worker core placement.
    pub affinity: AffinityConfig,

    /// Pin assignment.
    pub pins: PinMap,

    /// Iteration counts per access strategy.
    pub iterations: IterationConfig,

    /// Worker scheduling and memory locking.
    pub realtime: RealtimeConfig,
}

/// How pins are accessed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Manipulate the memory-mapped GPIO registers directly instead of
    /// going through the kernel's GPIO API.
    pub use_registers: bool,

    /// Physical base address of the register block.
    pub register_base: u64,

    /// Length of the register mapping in bytes.
    pub register_span: usize,

    /// Device the register block is mapped from (`/dev/mem` or `/dev/gpiomem`).
    pub register_device: PathBuf,

    /// GPIO character device used for API access and interrupts.
    pub chip: PathBuf,

    /// Consumer label attached to requested lines.
    pub consumer: String,

    /// How long an interrupt dispatcher waits before rechecking for unbind.
    #[serde(with = "humantime_serde")]
    pub interrupt_poll_interval: Duration,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            use_registers: true,
            register_base: GPIO_BASE_ADDR,
            register_span: GPIO_MAP_LEN,
            register_device: PathBuf::from("/dev/mem"),
            chip: PathBuf::from("/dev/gpiochip0"),
            consumer: String::from("rpi-gpio-test"),
            interrupt_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Read-write benchmark switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadWriteConfig {
    /// Use edge interrupts to drive the ping-pong.
    pub interrupt: bool,
    /// Use polling workers to drive the ping-pong.
    pub polling: bool,
    /// Yield the CPU on every poll iteration instead of spinning.
    pub yield_cpu: bool,
}

impl Default for ReadWriteConfig {
    fn default() -> Self {
        Self {
            interrupt: false,
            polling: true,
            yield_cpu: false,
        }
    }
}

/// Write-only benchmark switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOnlyConfig {
    /// Run the write-only benchmark inline during setup.
    pub blocking: bool,
    /// Run the write-only benchmark on a dedicated worker.
    pub threaded: bool,
}

impl Default for WriteOnlyConfig {
    fn default() -> Self {
        Self {
            blocking: true,
            threaded: false,
        }
    }
}

/// Worker core placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityConfig {
    /// Pin workers to the cores below.
    pub enabled: bool,
    /// Core for read-write worker A.
    pub worker_a: usize,
    /// Core for read-write worker B.
    pub worker_b: usize,
    /// Core for the write-only worker.
    pub write_only: usize,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_a: 1,
            worker_b: 2,
            write_only: 3,
        }
    }
}

/// Iteration counts for each scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationCounts {
    /// Interrupt-driven read-write iterations.
    pub rw_interrupt: u64,
    /// Polling read-write iterations.
    pub rw_polling: u64,
    /// Write-only set/clear pairs.
    pub write_only: u64,
}

/// Iteration counts calibrated per access strategy.
///
/// Register access is roughly ten times faster than the GPIO API, so it gets
/// ten times the iterations to keep run times comparable. A table that names
/// only some counts keeps the calibrated value for the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PartialIterations")]
pub struct IterationConfig {
    /// Counts used with register access.
    pub registers: IterationCounts,
    /// Counts used with GPIO API access.
    pub api: IterationCounts,
}

impl IterationCounts {
    /// Calibrated counts for register access.
    #[must_use]
    pub const fn registers() -> Self {
        Self {
            rw_interrupt: 500_000,
            rw_polling: 5_000_000,
            write_only: 10_000_000,
        }
    }

    /// Calibrated counts for GPIO API access.
    #[must_use]
    pub const fn api() -> Self {
        Self {
            rw_interrupt: 50_000,
            rw_polling: 500_000,
            write_only: 1_000_000,
        }
    }
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            registers: IterationCounts::registers(),
            api: IterationCounts::api(),
        }
    }
}

/// `[iterations]` as written in a file, before defaults are filled in.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialIterations {
    registers: PartialCounts,
    api: PartialCounts,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialCounts {
    rw_interrupt: Option<u64>,
    rw_polling: Option<u64>,
    write_only: Option<u64>,
}

impl PartialCounts {
    fn or(self, base: IterationCounts) -> IterationCounts {
        IterationCounts {
            rw_interrupt: self.rw_interrupt.unwrap_or(base.rw_interrupt),
            rw_polling: self.rw_polling.unwrap_or(base.rw_polling),
            write_only: self.write_only.unwrap_or(base.write_only),
        }
    }
}

impl From<PartialIterations> for IterationConfig {
    fn from(raw: PartialIterations) -> Self {
        Self {
            registers: raw.registers.or(IterationCounts::registers()),
            api: raw.api.or(IterationCounts::api()),
        }
    }
}

/// Scheduler policy applied to benchmark workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// `SCHED_FIFO`: First-in-first-out real-time.
    Fifo,
    /// `SCHED_RR`: Round-robin real-time.
    Rr,
    /// `SCHED_OTHER`: Normal time-sharing (non-RT).
    #[default]
    Other,
}

/// Real-time tuning for benchmark workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Lock all memory pages (mlockall) before starting.
    pub lock_memory: bool,
    /// Scheduler policy for workers.
    pub policy: SchedPolicy,
    /// Scheduler priority (1-99 for RT policies).
    pub priority: u8,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            lock_memory: false,
            policy: SchedPolicy::Other,
            priority: 90,
        }
    }
}

/// Pin access strategy selected by a validated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Memory-mapped register manipulation.
    Registers,
    /// Generic host GPIO API.
    Api,
}

impl std::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registers => write!(f, "register"),
            Self::Api => write!(f, "API"),
        }
    }
}

/// Read-write synchronization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategyKind {
    /// Edge interrupt handlers hand off between the pairs.
    InterruptChain,
    /// Two workers poll their inputs.
    PollLoop {
        /// Yield the CPU on every poll iteration.
        yield_cpu: bool,
    },
}

/// How the write-only benchmark runs, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOnlyMode {
    /// Not run.
    Disabled,
    /// Run during setup, blocking the caller.
    Inline,
    /// Run on a dedicated worker.
    Threaded,
}

/// Cores assigned to each worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreMap {
    /// Read-write worker A.
    pub worker_a: usize,
    /// Read-write worker B.
    pub worker_b: usize,
    /// Write-only worker.
    pub write_only: usize,
}

/// A validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchPlan {
    /// Access strategy.
    pub access: AccessKind,
    /// Read-write synchronization strategy.
    pub sync: SyncStrategyKind,
    /// Write-only benchmark mode.
    pub write_only: WriteOnlyMode,
    /// Core placement, when affinity is enabled.
    pub affinity: Option<CoreMap>,
    /// Pin assignment.
    pub pins: PinMap,
    /// Iteration counts for the selected access strategy.
    pub counts: IterationCounts,
    /// Worker real-time tuning.
    pub realtime: RealtimeConfig,
}

impl BenchPlan {
    /// Iterations for the selected read-write strategy.
    #[must_use]
    pub fn read_write_iterations(&self) -> u64 {
        match self.sync {
            SyncStrategyKind::InterruptChain => self.counts.rw_interrupt,
            SyncStrategyKind::PollLoop { .. } => self.counts.rw_polling,
        }
    }

    /// Number of reports a complete run publishes.
    #[must_use]
    pub fn expected_reports(&self) -> usize {
        match self.write_only {
            WriteOnlyMode::Disabled => 1,
            WriteOnlyMode::Inline | WriteOnlyMode::Threaded => 2,
        }
    }
}

impl BenchConfig {
    /// Check the switch matrix and produce a plan.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::ConfigurationConflict`] when mutually exclusive
    /// switches are both set, when neither read-write strategy is selected,
    /// or when two roles share a pin; [`BenchError::InvalidConfig`] when a
    /// pin cannot be addressed through the register layout or a selected
    /// benchmark would run zero iterations.
    pub fn validate(&self) -> BenchResult<BenchPlan> {
        let sync = match (self.read_write.interrupt, self.read_write.polling) {
            (true, true) => {
                return Err(BenchError::ConfigurationConflict(
                    "interrupt and polling read-write sync are mutually exclusive".into(),
                ))
            }
            (false, false) => {
                return Err(BenchError::ConfigurationConflict(
                    "one of interrupt or polling read-write sync must be selected".into(),
                ))
            }
            (true, false) => SyncStrategyKind::InterruptChain,
            (false, true) => SyncStrategyKind::PollLoop {
                yield_cpu: self.read_write.yield_cpu,
            },
        };

        let write_only = match (self.write_only.blocking, self.write_only.threaded) {
            (true, true) => {
                return Err(BenchError::ConfigurationConflict(
                    "blocking and threaded write-only benchmarks are mutually exclusive".into(),
                ))
            }
            (true, false) => WriteOnlyMode::Inline,
            (false, true) => WriteOnlyMode::Threaded,
            (false, false) => WriteOnlyMode::Disabled,
        };

        if let Some((a, b)) = self.pins.duplicate() {
            return Err(BenchError::ConfigurationConflict(format!(
                "{a} and {b} are both assigned GPIO {}",
                self.pins.pin(a)
            )));
        }

        let access = if self.access.use_registers {
            AccessKind::Registers
        } else {
            AccessKind::Api
        };

        if access == AccessKind::Registers {
            if let Some(role) = PinMap::ALL_ROLES
                .into_iter()
                .find(|r| self.pins.pin(*r).number() > MAX_REGISTER_PIN)
            {
                return Err(BenchError::InvalidConfig(format!(
                    "{role} (GPIO {}) is beyond the register layout (max {MAX_REGISTER_PIN})",
                    self.pins.pin(role)
                )));
            }
        }

        if self.read_write.interrupt && self.read_write.yield_cpu {
            warn!("yield_cpu only affects polling read-write sync; ignored with interrupts");
        }

        let affinity = self.affinity.enabled.then_some(CoreMap {
            worker_a: self.affinity.worker_a,
            worker_b: self.affinity.worker_b,
            write_only: self.affinity.write_only,
        });

        if let Some(cores) = affinity {
            if cores.worker_a == cores.worker_b {
                warn!(
                    core = cores.worker_a,
                    "read-write workers share a core; polling will serialize"
                );
            }
        }

        let access_key = match access {
            AccessKind::Registers => "registers",
            AccessKind::Api => "api",
        };
        let counts = match access {
            AccessKind::Registers => self.iterations.registers,
            AccessKind::Api => self.iterations.api,
        };

        let (rw_key, rw_count) = match sync {
            SyncStrategyKind::InterruptChain => ("rw_interrupt", counts.rw_interrupt),
            SyncStrategyKind::PollLoop { .. } => ("rw_polling", counts.rw_polling),
        };
        if rw_count == 0 {
            return Err(BenchError::InvalidConfig(format!(
                "iterations.{access_key}.{rw_key} must be at least 1"
            )));
        }
        if write_only != WriteOnlyMode::Disabled && counts.write_only == 0 {
            return Err(BenchError::InvalidConfig(format!(
                "iterations.{access_key}.write_only must be at least 1"
            )));
        }

        Ok(BenchPlan {
            access,
            sync,
            write_only,
            affinity,
            pins: self.pins,
            counts,
            realtime: self.realtime,
        })
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
