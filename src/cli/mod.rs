//! Command-line interface for swe-validate.
//!
//! Provides the agent batch driver, the model-free validation pipeline and
//! the results summary.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
