//! dvrip-dl command-line entry point
//!
//! Reads the configuration from the environment (and an optional `.env`
//! file), then either runs the download loop or moves the camera once.
//! A first SIGINT/SIGTERM stops after the file being downloaded; a second
//! one exits immediately.

use dvrip_dl::{
    Action, Config, DvripConnector, Error, FfmpegConverter, MediaKind, Orchestrator,
    wait_for_signal,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> dvrip_dl::Result<()> {
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("finishing current file, signal again to exit immediately");
        signal_token.cancel();
        wait_for_signal().await;
        warn!("exiting immediately");
        std::process::exit(130);
    });

    let connector = Arc::new(DvripConnector::new(config.camera.clone()));
    let converter = if config.action == Action::Download
        && config.download.kinds.contains(&MediaKind::Video)
    {
        FfmpegConverter::from_config(&config.convert)?
    } else {
        // Never invoked: nothing is converted without videos.
        FfmpegConverter::new("ffmpeg".into(), config.convert.frame_rate)
    };

    let action = config.action;
    let orchestrator = Orchestrator::new(config, connector, Arc::new(converter), shutdown);

    match action {
        Action::Download => orchestrator.run().await,
        Action::Move => match orchestrator.move_camera().await {
            Err(Error::ShuttingDown) => Ok(()),
            other => other,
        },
    }
}
