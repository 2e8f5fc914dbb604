//! Command-line crate for the bramble junction-tree partitioner.
//!
//! Splits into [`cli`] (argument parsing and command execution) and
//! [`logging`] (tracing bootstrap) so integration tests can drive
//! commands without spawning a process.

pub mod cli;
pub mod logging;
