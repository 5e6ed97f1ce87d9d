//! `dotlab list`: table of all remote variables.

use crate::cli::{CliError, GlobalArgs};
use clap::Args;
use dotlab_classify::VarType;
use dotlab_gitlab::ListOptions;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Filter by environment scope.
    #[arg(short, long, default_value = "")]
    pub environment: String,
}

pub async fn run(
    global: &GlobalArgs,
    args: ListArgs,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let (cfg, client) = super::build_client(global)?;

    let vars = client
        .list_variables(
            &cancel,
            &cfg.gitlab.project_id,
            ListOptions {
                environment_scope: args.environment.clone(),
                ..ListOptions::default()
            },
        )
        .await
        .map_err(|err| CliError::run(format!("list variables: {err}")))?;

    let key_width = vars
        .iter()
        .map(|v| v.key.len())
        .chain(std::iter::once("KEY".len()))
        .max()
        .unwrap_or(3);
    let scope_width = vars
        .iter()
        .map(|v| v.environment_scope.len())
        .chain(std::iter::once("SCOPE".len()))
        .max()
        .unwrap_or(5);

    println!("{:<key_width$}  {:<7}  {:<scope_width$}  {:<6}  PROTECTED", "KEY", "TYPE", "SCOPE", "MASKED");
    for v in &vars {
        let var_type = match v.variable_type {
            VarType::EnvVar => "env_var",
            VarType::File => "file",
        };
        println!(
            "{:<key_width$}  {:<7}  {:<scope_width$}  {:<6}  {}",
            v.key,
            var_type,
            v.environment_scope,
            if v.masked { "yes" } else { "-" },
            if v.protected { "yes" } else { "-" },
        );
    }
    println!("\nTotal: {} variables", vars.len());
    Ok(())
}
