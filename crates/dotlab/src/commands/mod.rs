//! Subcommand implementations and shared plumbing.

pub mod delete;
pub mod diff;
pub mod export;
pub mod list;
pub mod sync;

use crate::cli::{CliError, GlobalArgs};
use crate::config::{self, Config};
use dotlab_classify::Classifier;
use dotlab_gitlab::{Client, ClientConfig};
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Load config, apply flag overrides, validate, and build the client.
pub(crate) fn build_client(global: &GlobalArgs) -> Result<(Config, Arc<Client>), CliError> {
    let mut cfg = config::load(global.config.as_deref())?;

    // Flags (and their env fallbacks) win over the config file.
    if let Some(token) = &global.token {
        cfg.gitlab.token = token.clone();
    }
    if let Some(project) = &global.project {
        cfg.gitlab.project_id = project.clone();
    }
    if let Some(url) = &global.url {
        cfg.gitlab.url = url.clone();
    }
    cfg.validate()?;

    let rps = global
        .rate_limit
        .filter(|rps| *rps > 0.0)
        .unwrap_or(cfg.rate_limit.requests_per_second);
    let client = Client::new(ClientConfig {
        base_url: cfg.gitlab.url.clone(),
        token: cfg.gitlab.token.clone(),
        requests_per_second: rps,
        burst: 0,
        retry_max: cfg.rate_limit.retry_max,
        retry_initial_backoff: Duration::from_millis(cfg.rate_limit.retry_initial_backoff_ms),
        http: None,
    });

    Ok((cfg, Arc::new(client)))
}

/// Worker count: flag, then config, then the default of 5.
pub(crate) fn resolve_workers(global: &GlobalArgs, cfg: &Config) -> usize {
    global
        .workers
        .filter(|w| *w > 0)
        .or(Some(cfg.rate_limit.max_concurrent).filter(|w| *w > 0))
        .unwrap_or(5)
}

/// The classifier for a run, honouring user rule overrides.
pub(crate) fn build_classifier(cfg: &Config, no_auto_classify: bool) -> Classifier {
    if no_auto_classify {
        Classifier::empty()
    } else {
        Classifier::new(cfg.classify.clone())
    }
}

/// Dotenv path precedence: explicit flag, environment entry in config, `.env`.
pub(crate) fn resolve_env_file(
    flag: Option<&Path>,
    environment: &str,
    cfg: &Config,
) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if environment != "*" {
        if let Some(entry) = cfg.environments.get(environment) {
            if !entry.file.is_empty() {
                return PathBuf::from(&entry.file);
            }
        }
    }
    PathBuf::from(".env")
}

/// Interactive yes/no prompt. A non-interactive stdin declines instead of
/// prompting blindly and points at `--force`.
pub(crate) fn confirm(prompt: &str) -> bool {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        eprintln!("stdin is not interactive; pass --force to skip confirmation");
        return false;
    }

    print!("{prompt} [y/N] ");
    let _ = std::io::stdout().flush();

    let mut answer = String::new();
    match stdin.lock().read_line(&mut answer) {
        Ok(0) => {
            eprintln!("stdin is not interactive; pass --force to skip confirmation");
            false
        }
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(err) => {
            eprintln!("read stdin: {err}");
            false
        }
    }
}
