//! `dotlab diff`: show what a sync would change, without applying.

use crate::cli::{CliError, GlobalArgs};
use crate::output;
use clap::Args;
use dotlab_gitlab::ListOptions;
use dotlab_sync::{Engine, Options};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Path to the .env file (default: from config, or .env).
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// GitLab environment scope.
    #[arg(short, long, default_value = "*")]
    pub environment: String,

    /// Show variables that would be deleted.
    #[arg(long)]
    pub delete_missing: bool,
}

pub async fn run(
    global: &GlobalArgs,
    args: DiffArgs,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let (cfg, client) = super::build_client(global)?;

    let env_file = super::resolve_env_file(args.file.as_deref(), &args.environment, &cfg);
    let parsed = dotlab_envfile::parse_file(&env_file)
        .map_err(|err| CliError::run(format!("parse {}: {err}", env_file.display())))?;

    let engine = Engine::new(
        client.clone(),
        super::build_classifier(&cfg, false),
        Options {
            workers: super::resolve_workers(global, &cfg),
            dry_run: true,
            delete_missing: args.delete_missing,
        },
        cfg.gitlab.project_id.clone(),
    );

    let remote = client
        .list_variables(
            &cancel,
            &cfg.gitlab.project_id,
            ListOptions {
                environment_scope: args.environment.clone(),
                ..ListOptions::default()
            },
        )
        .await
        .map_err(|err| CliError::run(format!("list remote variables: {err}")))?;

    let mut diff = engine.diff(&parsed.entries, remote, &args.environment);
    super::sync::append_parser_skips(&mut diff, &parsed);

    output::print_diff(&diff.changes);
    output::print_diff_summary(&diff.changes);
    Ok(())
}
