//! dotlab: sync .env files to GitLab CI/CD project variables.

mod cli;
mod commands;
mod config;
mod output;

use clap::Parser;
use cli::{Cli, CliError, Commands};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();
    output::setup_color(cli.global.no_color);

    // Ctrl-C cancels the token; in-flight work drains instead of being
    // abandoned, so the final report still covers every change.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupted; letting in-flight work finish...");
                cancel.cancel();
            }
        });
    }

    let exit_code = match run(cli, cancel).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(err));
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), CliError> {
    match cli.command {
        Commands::Sync(args) => commands::sync::run(&cli.global, args, cancel).await,
        Commands::Diff(args) => commands::diff::run(&cli.global, args, cancel).await,
        Commands::List(args) => commands::list::run(&cli.global, args, cancel).await,
        Commands::Export(args) => commands::export::run(&cli.global, args, cancel).await,
        Commands::Delete(args) => commands::delete::run(&cli.global, args, cancel).await,
        Commands::Version => {
            println!("dotlab {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dotlab=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
