//! Command-line interface
//!
//! Argument parsing for the `stakecoin` binary.

pub mod commands;

pub use commands::{Command, Opt};
