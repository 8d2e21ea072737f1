//! Frame Scrambler CLI
//!
//! Cuts a video into randomly sized chunks, shuffles them and encodes the
//! permuted frames as a new video.
//!
//! # Usage
//!
//! ```bash
//! scrambler scramble --input holiday.mp4 --chunk-duration 1.5 --variance 6
//! scrambler scramble --input holiday.mp4 --seed 42 --pacing drop-frames --upload
//! scrambler probe --input holiday.mp4 --fps 30
//! ```

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use frame_scrambler::cli::{commands, Cli, Commands};
use frame_scrambler::config_initialization::initialize_configuration_hierarchy;
use frame_scrambler::utils::logging::log_system_info;
use frame_scrambler::ScramblerError;

/// How long blocking decoder work may hold the process open after the command returns
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Main entry point for the scrambler CLI
fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(run(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<ScramblerError>()
                .map(ScramblerError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let resolved = initialize_configuration_hierarchy(cli.config.as_deref(), &cli.overrides())
        .context("Failed to load configuration")?;
    let config = resolved.config;

    // A subscriber may already be installed when embedded
    if let Err(e) = config.logging().init() {
        eprintln!("Logging not initialized: {}", e);
    }

    info!("Starting Frame Scrambler");
    debug!("Configuration layers: {}", resolved.layers.join(", "));
    log_system_info();

    frame_scrambler::init()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Scramble(args) => {
            info!("Executing scramble command");
            commands::scramble(args, &config, cancel).await?;
        }
        Commands::Probe(args) => {
            info!("Executing probe command");
            commands::probe(args, &config).await?;
        }
    }

    info!("Frame Scrambler completed successfully");
    Ok(())
}
