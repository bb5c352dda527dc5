use std::process::ExitCode;

use clap::Parser;
use coinpurse::cli::Cli;
use tracing_subscriber::EnvFilter;

fn setup_tracing(verbose: bool) {
    let default_filter = if verbose {
        "coinpurse=debug"
    } else {
        "coinpurse=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);
    cli.execute().await
}
