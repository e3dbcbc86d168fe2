//! Scenario tests grouped by benchmark.

mod common;
mod interrupt_chain_test;
mod orchestrator_test;
mod poll_loop_test;
mod write_only_test;
