use thiserror::Error;

/// Benchmark error types covering configuration and resource acquisition failures.
///
/// Every variant is fatal to the run. Nothing inside a running benchmark loop
/// produces one of these; only setup and teardown do.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BenchError {
    /// Two mutually exclusive options were selected (or a required choice was left empty).
    #[error("configuration conflict: {0}")]
    ConfigurationConflict(String),

    /// A configuration value is outside the supported range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The GPIO register block could not be mapped.
    #[error("cannot map GPIO registers at {base:#x} ({len} bytes): {reason}")]
    ResourceMapping {
        /// Physical base address requested.
        base: u64,
        /// Length of the mapping in bytes.
        len: usize,
        /// Underlying cause.
        reason: String,
    },

    /// A pin is already owned or does not exist.
    #[error("cannot request GPIO {pin}: {reason}")]
    PinAcquisition {
        /// Pin that failed.
        pin: u32,
        /// Underlying cause.
        reason: String,
    },

    /// The host rejected the requested pin direction.
    #[error("cannot configure GPIO {pin}: {reason}")]
    PinConfiguration {
        /// Pin that failed.
        pin: u32,
        /// Underlying cause.
        reason: String,
    },

    /// The interrupt handler could not be registered.
    #[error("cannot bind interrupt handler for GPIO {pin}: {reason}")]
    InterruptBinding {
        /// Pin whose edge interrupt was requested.
        pin: u32,
        /// Underlying cause.
        reason: String,
    },

    /// A worker thread could not be spawned.
    #[error("unable to create worker {name}: {reason}")]
    WorkerCreation {
        /// Worker name.
        name: String,
        /// Underlying cause.
        reason: String,
    },

    /// Invalid lifecycle transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

/// Convenience type alias for benchmark operations.
pub type BenchResult<T> = Result<T, BenchError>;
