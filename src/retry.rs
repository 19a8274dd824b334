//! Retry policy and error classification
//!
//! Dropped connections are expected: battery cameras disconnect after a few
//! minutes of streaming. [`IsRetryable`] separates those transport failures
//! from protocol faults, and [`RetryPolicy`] makes the backoff interval and
//! the (optional) attempt cap explicit values instead of a hidden infinite
//! loop.
//!
//! # Example
//!
//! ```
//! use dvrip_dl::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let forever = RetryPolicy::unbounded(Duration::from_secs(2));
//! assert!(forever.allows(1_000_000));
//!
//! let capped = RetryPolicy::bounded(Duration::from_millis(10), 3);
//! assert!(capped.allows(2));
//! assert!(!capped.allows(3));
//! ```

use crate::config::RetryConfig;
use crate::error::{DeviceError, Error};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (connection reset, timeout, device went away) return `true`.
/// Permanent failures (malformed reply, rejected command, local disk errors) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for DeviceError {
    fn is_retryable(&self) -> bool {
        match self {
            DeviceError::Disconnected(_) => true,
            DeviceError::Io(e) => is_transient_io(e),
            // A refused handshake may be a camera still waking up
            DeviceError::AuthenticationFailed(_) => true,
            DeviceError::Protocol(_) => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Device(e) => e.is_retryable(),
            Error::Io(e) => is_transient_io(e),
            Error::Config { .. }
            | Error::FileListing { .. }
            | Error::Download(_)
            | Error::LoginRetriesExhausted { .. }
            | Error::InvalidRemoteName { .. }
            | Error::ExternalTool(_)
            | Error::Serialization(_)
            | Error::ShuttingDown => false,
        }
    }
}

fn is_transient_io(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::Interrupted
    )
}

/// Fixed-backoff retry strategy with an optional attempt cap
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub backoff: Duration,
    /// Maximum number of attempts (None = unbounded)
    pub max_attempts: Option<u32>,
    /// Stretch each delay by a random 0-100%
    pub jitter: bool,
}

impl RetryPolicy {
    /// Retry forever with a fixed delay
    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            backoff,
            max_attempts: None,
            jitter: false,
        }
    }

    /// Retry at most `max_attempts` times with a fixed delay
    pub fn bounded(backoff: Duration, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: Some(max_attempts),
            jitter: false,
        }
    }

    /// Policy for reconnecting after a dropped download
    pub fn for_downloads(config: &RetryConfig) -> Self {
        Self {
            backoff: config.backoff,
            max_attempts: config.download_max_attempts,
            jitter: config.jitter,
        }
    }

    /// Policy for the per-cycle login
    pub fn for_login(config: &RetryConfig) -> Self {
        Self {
            backoff: config.backoff,
            max_attempts: Some(config.login_max_attempts),
            jitter: config.jitter,
        }
    }

    /// Whether another attempt may follow `attempts_made` attempts
    #[must_use]
    pub fn allows(&self, attempts_made: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts_made < max)
    }

    /// Delay before the next attempt
    pub fn delay(&self) -> Duration {
        if self.jitter {
            add_jitter(self.backoff)
        } else {
            self.backoff
        }
    }

    /// Sleep for [`delay`](Self::delay), waking early on shutdown
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] if `shutdown` fires first.
    pub async fn wait(&self, shutdown: &CancellationToken) -> Result<(), Error> {
        let delay = self.delay();
        if shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = shutdown.cancelled() => Err(Error::ShuttingDown),
        }
    }
}

/// Add random jitter to a delay
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
