//! Command-line interface for ghg-pipeline.
//!
//! Provides the `run` command, which executes workflow runs and prints a
//! summary of their terminal states.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, RunArgs};
