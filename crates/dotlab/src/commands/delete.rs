//! `dotlab delete`: remove remote variables by key.

use crate::cli::{CliError, GlobalArgs};
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Variable keys to delete.
    #[arg(required = true, value_name = "KEY")]
    pub keys: Vec<String>,

    /// Environment scope of the variables to delete.
    #[arg(short, long, default_value = "")]
    pub environment: String,

    /// Skip the confirmation prompt.
    #[arg(long)]
    pub force: bool,
}

pub async fn run(
    global: &GlobalArgs,
    args: DeleteArgs,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let (cfg, client) = super::build_client(global)?;

    if !args.force {
        println!(
            "Delete {} variable(s): {}",
            args.keys.len(),
            args.keys.join(", ")
        );
        if !super::confirm("Confirm deletion?") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let mut failed = 0usize;
    for key in &args.keys {
        match client
            .delete_variable(&cancel, &cfg.gitlab.project_id, key, &args.environment)
            .await
        {
            Ok(()) => println!("{}", format!("✓ deleted {key}").green()),
            Err(err) => {
                println!("{}", format!("✗ {key}: {err}").red());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        Err(CliError::run(format!("{failed} deletion(s) failed")))
    } else {
        Ok(())
    }
}
