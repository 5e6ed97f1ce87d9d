//! `dotlab export`: write remote variables back out as dotenv lines.

use crate::cli::{CliError, GlobalArgs};
use clap::Args;
use dotlab_classify::VarType;
use dotlab_gitlab::{ListOptions, Variable};
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Filter by environment scope.
    #[arg(short, long, default_value = "")]
    pub environment: String,

    /// Output file path (default: stdout).
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

pub async fn run(
    global: &GlobalArgs,
    args: ExportArgs,
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

    let rendered = render(&vars);

    match &args.output {
        Some(path) => {
            let mut file = open_secret_file(path)
                .map_err(|err| CliError::run(format!("create output file: {err}")))?;
            file.write_all(rendered.as_bytes())
                .and_then(|()| file.flush())
                .map_err(|err| CliError::run(format!("write {}: {err}", path.display())))?;
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

/// Exported values may contain tokens; keep the file owner-only.
fn open_secret_file(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn render(vars: &[Variable]) -> String {
    let mut out = String::new();
    for v in vars {
        // File-typed values are raw file contents (certificates, PEM keys)
        // and would produce unreadable .env lines.
        if v.variable_type == VarType::File {
            out.push_str(&format!("# {} (file type, skipped)\n", v.key));
            continue;
        }
        out.push_str(&format!("{}={}\n", v.key, quote_value(&v.value)));
    }
    out
}

/// Double-quote and escape values the dotenv grammar cannot carry bare, so
/// the output round-trips through the parser and survives shell sourcing.
fn quote_value(value: &str) -> String {
    if !value.contains([' ', '\t', '\n', '\r', '"', '\'', '\\', '$']) {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\r' => quoted.push_str("\\r"),
            '\n' => quoted.push_str("\\n"),
            '"' => quoted.push_str("\\\""),
            '$' => quoted.push_str("\\$"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}
