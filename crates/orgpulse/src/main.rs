//! orgpulse CLI: group analytics reporting job.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use orgpulse::portal::MemoryPortal;
use orgpulse::{Config, execute, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "orgpulse", about = "Publish group analytics tables to a GIS portal")]
struct CliArgs {
    /// Path to the YAML config file.
    #[arg(short, long, default_value = "orgpulse.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();
    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Failed to load config: {error}");
            return ExitCode::FAILURE;
        }
    };

    let fixture = match &config.portal.fixture {
        Some(path) => path.clone(),
        None => {
            // validate() requires a fixture for the memory backend
            eprintln!("No portal fixture configured");
            return ExitCode::FAILURE;
        }
    };
    let portal = match MemoryPortal::from_fixture_file(&fixture) {
        Ok(portal) => portal,
        Err(error) => {
            eprintln!("Failed to open portal fixture {}: {error}", fixture.display());
            return ExitCode::FAILURE;
        }
    };

    info!(config = %args.config.display(), fixture = %fixture.display(), "starting orgpulse run");
    match execute(&config, &portal).await {
        Ok(outcome) if !outcome.failed => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("Run failed: {error}");
            ExitCode::FAILURE
        }
    }
}
