//! CLI module for deepdive
//!
//! Provides command-line interface parsing for the deepdive binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// deepdive - multi-round literature research from the terminal
///
/// A supervisor model plans research rounds, researchers search and screen
/// scholarly works, and the findings are synthesized into a cited report.
#[derive(Parser, Debug)]
#[command(
    name = "deepdive",
    version,
    about = "deepdive - multi-round literature research",
    long_about = "Answers an open-ended research question by iteratively deciding what to\n\
                  investigate, delegating topics to researchers that search OpenAlex, and\n\
                  synthesizing a cited markdown report.",
    after_help = "EXAMPLES:\n    \
                  deepdive run \"compare method A and method B\"\n    \
                  deepdive run \"sparse attention\" --max-rounds 4 --timeout 120\n    \
                  deepdive run \"graph neural networks\" --json > report.json\n    \
                  deepdive config --validate"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "deepdive.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a research session and print the report
    ///
    /// Press Ctrl-C to stop early; the report is still produced from
    /// whatever was gathered.
    Run {
        /// The research question
        question: String,

        /// Override the maximum number of rounds
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Override the session timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Let researchers read full text where available
        #[arg(long)]
        fulltext: bool,

        /// Print the full report as JSON instead of markdown
        #[arg(long)]
        json: bool,
    },

    /// Show configuration information
    Config {
        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "deepdive",
            "run",
            "compare method A and method B",
            "--max-rounds",
            "4",
            "--timeout",
            "60",
            "--fulltext",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                question,
                max_rounds,
                timeout,
                fulltext,
                json,
            } => {
                assert_eq!(question, "compare method A and method B");
                assert_eq!(max_rounds, Some(4));
                assert_eq!(timeout, Some(60));
                assert!(fulltext);
                assert!(!json);
            }
            other => panic!("Expected run, got {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from("deepdive.toml"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["deepdive", "config", "--validate", "--no-color", "-c", "x.toml"])
                .unwrap();
        assert!(cli.no_color);
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(matches!(cli.command, Commands::Config { validate: true }));
    }

    #[test]
    fn test_run_requires_question() {
        assert!(Cli::try_parse_from(["deepdive", "run"]).is_err());
    }
}
