//! Command-line interface
//!
//! This module contains the CLI commands and argument parsing
//! for probing a single node.

pub mod commands;

pub use commands::{Command, NetworkArg, Opt};
