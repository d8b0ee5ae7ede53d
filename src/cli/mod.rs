//! CLI module for the stack planner.
//!
//! This module provides the command-line interface for planning stack
//! updates and inspecting the planner's configuration and schemas.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
