// src/main.rs

//! The main entry point for the ringleader orchestrator.

use anyhow::Result;
use ringleader::cli;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run_app().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Error: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<bool> {
    let commands = cli::discovered_commands();
    let matches = cli::build_cli(&commands).get_matches();

    // Verbosity flags map onto the tracing filter; RUST_LOG wins when set.
    let default_level = match matches.get_count("verbose") {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .compact()
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();

    cli::dispatch(&matches, &commands).await
}
