//! Command-line surface and error rendering.

use crate::commands::{
    delete::DeleteArgs, diff::DiffArgs, export::ExportArgs, list::ListArgs, sync::SyncArgs,
};
use clap::{Args, Parser, Subcommand};
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Sync .env files to GitLab CI/CD project variables.
#[derive(Debug, Parser)]
#[command(name = "dotlab", version, about, max_term_width = 100)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared across all subcommands.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Path to the .dotlab.yml config file.
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// GitLab private token.
    #[arg(long, global = true, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// GitLab project ID or full path.
    #[arg(long, global = true, env = "GITLAB_PROJECT_ID")]
    pub project: Option<String>,

    /// GitLab base URL.
    #[arg(long, global = true, env = "GITLAB_URL")]
    pub url: Option<String>,

    /// Print planned changes without applying them.
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Disable coloured output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Number of concurrent apply workers.
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Maximum API requests per second.
    #[arg(long, global = true, value_name = "RPS")]
    pub rate_limit: Option<f64>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Push variables from a .env file to GitLab CI/CD.
    Sync(SyncArgs),
    /// Show what would change without applying.
    Diff(DiffArgs),
    /// List all GitLab CI/CD variables.
    List(ListArgs),
    /// Export GitLab CI/CD variables as KEY=VALUE lines.
    Export(ExportArgs),
    /// Delete one or more GitLab CI/CD variables.
    Delete(DeleteArgs),
    /// Print the dotlab version.
    Version,
}

/// CLI-level errors. Everything exits with code 1; the variants only steer
/// the rendered diagnostic.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("configuration error: {message}")]
    #[diagnostic(code(dotlab::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(dotlab::run))]
    Run {
        message: String,
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn run(message: impl Into<String>) -> Self {
        Self::Run {
            message: message.into(),
            help: None,
        }
    }

    #[allow(dead_code)]
    pub fn run_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Run {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<crate::config::ConfigError> for CliError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::config(err.to_string())
    }
}
