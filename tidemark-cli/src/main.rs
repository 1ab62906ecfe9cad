//! Tidemark CLI - versioned database migrations.

use clap::Parser;

use tidemark_cli::cli::Cli;
use tidemark_cli::commands;
use tidemark_cli::error::CliResult;
use tidemark_cli::{logging, output};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::diagnostic(e);
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    commands::run(cli).await
}
