#![doc = "Benchmark engine for the GPIO throughput harness."]

pub mod orchestrator;
pub mod realtime;
pub mod sync;
pub mod worker;
pub mod write_only;

pub use orchestrator::*;
pub use realtime::*;
pub use sync::*;
pub use worker::*;
pub use write_only::*;
