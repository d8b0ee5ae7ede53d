//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stackplan - update-impact planner for declarative stacks.
#[derive(Parser, Debug)]
#[command(name = "stackplan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "STACKPLAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (json, yaml).
    #[arg(long, global = true, default_value = "json")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute the impact of updating a live stack.
    Plan {
        /// Name of the live stack.
        #[arg(short, long)]
        stack: String,

        /// Proposed template file (JSON or YAML).
        #[arg(short, long)]
        template: PathBuf,

        /// Proposed parameter value, as KEY=VALUE. Repeatable.
        #[arg(short, long = "parameter", value_name = "KEY=VALUE")]
        parameters: Vec<String>,
    },

    /// Validate the planner configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the update behaviour known for a resource type.
    Schema {
        /// Resource type (e.g. `AWS::EC2::Instance`).
        resource_type: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output.
    #[default]
    Json,
    /// YAML output.
    Yaml,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan() {
        let cli = Cli::try_parse_from([
            "stackplan",
            "plan",
            "--stack",
            "app",
            "--template",
            "app.yaml",
            "-p",
            "Env=prod",
            "--parameter",
            "Size=2",
            "--output",
            "yaml",
        ])
        .expect("parse");

        assert_eq!(cli.output, OutputFormat::Yaml);
        match cli.command {
            Commands::Plan {
                stack, parameters, ..
            } => {
                assert_eq!(stack, "app");
                assert_eq!(parameters, vec!["Env=prod", "Size=2"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_plan_requires_stack() {
        assert!(Cli::try_parse_from(["stackplan", "plan", "--template", "t.yaml"]).is_err());
    }
}
