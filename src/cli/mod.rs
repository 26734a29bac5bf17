//! Command-line interface for mw2-pipeline.
//!
//! Provides the `run`, `optimize`, `stats`, `trajectories` and `plan`
//! subcommands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
