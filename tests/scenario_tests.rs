//! End-to-end benchmark scenarios on the simulated loopback board.
//!
//! These run the full orchestrator against `SimBoard`, which records pin
//! events and counts every acquisition, so resource handling and hop
//! ordering can be checked without hardware.

mod scenarios;
