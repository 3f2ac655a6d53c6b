//! Command-line argument parsing for askdb.

use crate::config::Config;
use crate::error::{AskError, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON documents.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// Ask a banking database questions in plain language.
#[derive(Parser, Debug)]
#[command(name = "askdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Database URL (e.g., sqlite://banking.db); overrides config and DATABASE_URL
    #[arg(long, global = true, value_name = "URL")]
    pub database_url: Option<String>,

    /// LLM provider: rules, openai or anthropic
    #[arg(long, global = true, value_name = "PROVIDER")]
    pub llm: Option<String>,

    /// Use the in-memory mock database
    #[arg(long, global = true)]
    pub mock_db: bool,

    /// Output format
    #[arg(long, global = true, value_name = "FORMAT", default_value = "text")]
    pub output: String,

    /// Write logs to the askdb log file instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// askdb subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Answer a question with a validated, bounded query
    Ask {
        /// The question, e.g. "How many premium customers do we have?"
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Run the safety validator on a SQL string
    Validate {
        /// SQL to check
        sql: String,
    },
    /// Print the table whitelist
    Schema,
    /// Check database connectivity and whitelisted tables
    Health,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parses the output format from the --output argument.
    pub fn output_format(&self) -> Result<OutputFormat> {
        self.output.parse().map_err(AskError::config)
    }

    /// Applies command-line overrides on top of file and environment config.
    pub fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        }
        if let Some(provider) = &self.llm {
            config.llm.provider = provider
                .parse()
                .map_err(|e: String| AskError::config(format!("--llm: {e}")))?;
        }
        Ok(())
    }

    /// Returns the question for `ask`, joined into one string.
    pub fn question(&self) -> Option<String> {
        match &self.command {
            Command::Ask { question } => Some(question.join(" ")),
            _ => None,
        }
    }
}
