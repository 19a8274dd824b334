//! # dvrip-dl
//!
//! Scheduled downloader for recordings stored on battery-powered DVRIP
//! ("Sofia"/XMeye) cameras.
//!
//! ## Overview
//!
//! Each cycle logs in to the camera, lists the recordings of a time range,
//! downloads every file that is neither on disk nor suppressed by the skip
//! list, remuxes videos with ffmpeg and logs out. Dropped connections are
//! expected: a download is retried from scratch after reconnecting and
//! logging in again.
//!
//! - [`device`] - the camera protocol behind the [`DeviceClient`] trait
//! - [`catalog`] - paginated file listing
//! - [`session`] / [`downloader`] - single attempts and the reconnect loop
//! - [`convert`] - ffmpeg remuxing
//! - [`orchestrator`] - the cycle, the cooldown loop and the move action
//!
//! ## Quick Start
//!
//! ```no_run
//! use dvrip_dl::{Config, DvripConnector, FfmpegConverter, Orchestrator};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let connector = Arc::new(DvripConnector::new(config.camera.clone()));
//!     let converter = Arc::new(FfmpegConverter::from_config(&config.convert)?);
//!
//!     let orchestrator = Orchestrator::new(config, connector, converter, CancellationToken::new());
//!     orchestrator.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Paginated listing of remote recordings
pub mod catalog;
/// Configuration types
pub mod config;
/// Video conversion
pub mod convert;
/// Camera protocol client
pub mod device;
/// Download with reconnect and re-login
pub mod downloader;
/// Error types
pub mod error;
/// Local target path derivation
pub mod naming;
/// Download cycle and scheduling loop
pub mod orchestrator;
/// Retry policy and error classification
pub mod retry;
/// Device session and single download attempts
pub mod session;
/// Persisted skip list
pub mod skip_list;
/// Core types
pub mod types;

// Re-export commonly used types
pub use catalog::FileCatalog;
pub use config::Config;
pub use convert::{ConversionResult, FfmpegConverter, MediaConverter};
pub use device::{DeviceClient, DeviceConnector, DvripClient, DvripConnector};
pub use downloader::ResilientDownloader;
pub use error::{DeviceError, DownloadError, Error, Result};
pub use orchestrator::{CycleReport, Orchestrator};
pub use retry::{IsRetryable, RetryPolicy};
pub use session::DownloadSession;
pub use skip_list::SkipList;
pub use types::{Action, DeviceStatus, Direction, DownloadOutcome, MediaKind, RemoteFile};

/// Wait for a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let shutdown = CancellationToken::new();
/// let token = shutdown.clone();
/// tokio::spawn(async move {
///     dvrip_dl::wait_for_signal().await;
///     token.cancel();
/// });
/// # }
/// ```
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

/// Wait for Ctrl+C
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
