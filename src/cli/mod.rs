//! Command-line interface
//!
//! Argument parsing and the command handlers behind it.

pub mod args;
pub mod commands;
