//! `dotlab sync`: push a .env file into the remote variable store.

use crate::cli::{CliError, GlobalArgs};
use crate::config::Config;
use crate::output;
use clap::Args;
use dotlab_envfile::{ParseOutcome, SkippedLine};
use dotlab_gitlab::{Client, ListOptions};
use dotlab_sync::{Change, ChangeKind, DiffResult, Engine, Options};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Path to the .env file (default: from config, or .env).
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// GitLab environment scope.
    #[arg(short, long, default_value = "*")]
    pub environment: String,

    /// Sync every environment defined in the config file.
    #[arg(short, long)]
    pub all: bool,

    /// Delete remote variables not present in the .env file.
    #[arg(long)]
    pub delete_missing: bool,

    /// Disable automatic variable classification.
    #[arg(long)]
    pub no_auto_classify: bool,

    /// Skip the confirmation prompt for deletions.
    #[arg(long)]
    pub force: bool,
}

pub async fn run(
    global: &GlobalArgs,
    args: SyncArgs,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let (cfg, client) = super::build_client(global)?;

    if args.all {
        if cfg.environments.is_empty() {
            return Err(CliError::config_with_help(
                "--all requires environments to be defined in the config file",
                "add an environments: section to .dotlab.yml",
            ));
        }

        let mut failed = Vec::new();
        // BTreeMap iteration gives a stable, sorted environment order.
        for name in cfg.environments.keys() {
            let env_file = super::resolve_env_file(args.file.as_deref(), name, &cfg);
            println!(
                "\n=== Syncing environment: {name} (file: {}) ===",
                env_file.display()
            );
            if let Err(err) =
                sync_one(global, &args, &cfg, client.clone(), &env_file, name, &cancel).await
            {
                eprintln!("error syncing {name}: {err}");
                failed.push(name.clone());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(CliError::run(format!(
                "{} environment(s) failed to sync: {}",
                failed.len(),
                failed.join(", ")
            )))
        }
    } else {
        let env_file = super::resolve_env_file(args.file.as_deref(), &args.environment, &cfg);
        sync_one(
            global,
            &args,
            &cfg,
            client,
            &env_file,
            &args.environment,
            &cancel,
        )
        .await
    }
}

/// Sync one dotenv file into one environment scope.
async fn sync_one(
    global: &GlobalArgs,
    args: &SyncArgs,
    cfg: &Config,
    client: Arc<Client>,
    env_file: &Path,
    scope: &str,
    cancel: &CancellationToken,
) -> Result<(), CliError> {
    let parsed = dotlab_envfile::parse_file(env_file)
        .map_err(|err| CliError::run(format!("parse {}: {err}", env_file.display())))?;
    info!(
        file = %env_file.display(),
        entries = parsed.entries.len(),
        skipped = parsed.skipped.len(),
        "parsed env file"
    );

    let engine = Engine::new(
        client.clone(),
        super::build_classifier(cfg, args.no_auto_classify),
        Options {
            workers: super::resolve_workers(global, cfg),
            dry_run: global.dry_run,
            delete_missing: args.delete_missing,
        },
        cfg.gitlab.project_id.clone(),
    );

    let remote = client
        .list_variables(
            cancel,
            &cfg.gitlab.project_id,
            ListOptions {
                environment_scope: scope.to_string(),
                ..ListOptions::default()
            },
        )
        .await
        .map_err(|err| CliError::run(format!("list remote variables: {err}")))?;

    let mut diff = engine.diff(&parsed.entries, remote, scope);
    append_parser_skips(&mut diff, &parsed);

    output::print_diff(&diff.changes);

    if global.dry_run {
        output::print_diff_summary(&diff.changes);
        return Ok(());
    }

    // Only prompt when deletions would actually happen.
    if args.delete_missing && !args.force {
        let deletes = diff.count(ChangeKind::Delete);
        if deletes > 0 && !super::confirm(&format!("Delete {deletes} variable(s)?")) {
            println!("Aborted.");
            return Ok(());
        }
    }

    println!(
        "\nSyncing: {} → project {} ({})",
        env_file.display(),
        cfg.gitlab.project_id,
        scope
    );
    println!("{}\n", output::SEPARATOR);

    let report = engine
        .apply_with_callback(cancel, diff, |result| output::print_result(result))
        .await;
    output::print_report(&report);

    if report.is_failure() {
        Err(CliError::run(format!(
            "{} variable(s) failed to sync",
            report.failed
        )))
    } else {
        Ok(())
    }
}

/// Surface parser skips (placeholders, interpolation) in the change list so
/// they show up in the diff output and the report's skipped counter.
pub(crate) fn append_parser_skips(diff: &mut DiffResult, parsed: &ParseOutcome) {
    for SkippedLine { key, reason, .. } in &parsed.skipped {
        if let Some(key) = key {
            let mut change = Change::new(ChangeKind::Skipped, key.clone());
            change.skip_reason = Some(reason.to_string());
            diff.changes.push(change);
        }
    }
}
