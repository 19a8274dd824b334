//! Error types for dvrip-dl
//!
//! This module provides the error taxonomy of the downloader:
//! - Device/transport errors, split into retryable disconnects and protocol faults
//! - Listing failures that end the current cycle
//! - Configuration errors that abort the process at startup
//! - Per-file download errors that abort a single recording

use thiserror::Error;

/// Result type alias for dvrip-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dvrip-dl
///
/// Each variant carries enough context to be logged and acted on by the
/// orchestrator without inspecting error strings.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "IP_ADDRESS")
        key: Option<String>,
    },

    /// Device protocol or connection error
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// The device answered the file query with a non-success status
    #[error("file listing failed with device status {status:?}")]
    FileListing {
        /// The `Ret` code reported by the device (None when no reply arrived)
        status: Option<i64>,
    },

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Login did not succeed within the configured number of attempts
    #[error("could not log in after {attempts} attempts")]
    LoginRetriesExhausted {
        /// Number of login attempts that were made
        attempts: u32,
    },

    /// A remote file name did not have the expected path layout
    #[error("invalid remote file name {name:?}: {reason}")]
    InvalidRemoteName {
        /// The remote name as reported by the device
        name: String,
        /// Why the name could not be used
        reason: String,
    },

    /// External tool execution failed (ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown was requested while the operation was waiting
    #[error("shutdown in progress")]
    ShuttingDown,
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Errors raised by a [`DeviceClient`](crate::device::DeviceClient)
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The connection dropped or the device stopped answering
    #[error("device disconnected: {0}")]
    Disconnected(String),

    /// Login or handshake was refused by the device
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The device sent something that does not follow the protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Socket-level I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-file download errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The device rejected a playback command
    #[error("playback {action} rejected for {name}: status {status:?}")]
    PlaybackRejected {
        /// Remote file name
        name: String,
        /// The playback action that was rejected (e.g., "Claim")
        action: String,
        /// The `Ret` code reported by the device
        status: Option<i64>,
    },

    /// The stream completed but delivered no data
    #[error("download of {name} completed with an empty payload")]
    EmptyPayload {
        /// Remote file name
        name: String,
    },

    /// Disconnect retries were exhausted (only with a capped retry policy)
    #[error("gave up on {name} after {attempts} disconnects")]
    RetriesExhausted {
        /// Remote file name
        name: String,
        /// Number of attempts made
        attempts: u32,
    },
}
