//! Download with automatic reconnect and re-login
//!
//! Battery cameras drop the connection mid-transfer as a matter of course.
//! [`ResilientDownloader`] turns a single [`DownloadSession::attempt`] into a
//! loop that replaces the session, waits out the backoff, logs in again and
//! restarts the same file from byte zero until the attempt succeeds or fails
//! for a reason reconnecting cannot fix.

use crate::device::DeviceConnector;
use crate::error::{DownloadError, Error, Result};
use crate::retry::RetryPolicy;
use crate::session::DownloadSession;
use crate::types::{DownloadOutcome, RemoteFile};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Retries a download across disconnects
pub struct ResilientDownloader {
    connector: Arc<dyn DeviceConnector>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl ResilientDownloader {
    /// Create a downloader reconnecting through `connector` under `policy`
    pub fn new(connector: Arc<dyn DeviceConnector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop waiting between attempts once `shutdown` is cancelled
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// The policy governing reconnects
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Download `file` into `target`, reconnecting as often as the policy allows
    ///
    /// After each disconnect the session is replaced with a fresh connection
    /// and authenticated again; a failed re-login is retried with the same
    /// backoff. The partial target has already been removed by the failed
    /// attempt, so every retry starts from an empty file.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// - The attempt's error when it failed fatally (rejected playback, empty
    ///   payload, local I/O).
    /// - [`DownloadError::RetriesExhausted`] or [`Error::LoginRetriesExhausted`]
    ///   when a capped policy runs out.
    /// - [`Error::ShuttingDown`] when shutdown is requested during a backoff.
    pub async fn download(
        &self,
        session: &mut DownloadSession,
        file: &RemoteFile,
        target: &Path,
    ) -> Result<u64> {
        let mut disconnects = 0u32;

        loop {
            match session.attempt(file, target).await {
                DownloadOutcome::Success { bytes } => return Ok(bytes),
                DownloadOutcome::Fatal(e) => {
                    error!(remote = %file.name, error = %e, "download failed");
                    return Err(e);
                }
                DownloadOutcome::Disconnected { reason } => {
                    disconnects += 1;
                    if !self.policy.allows(disconnects) {
                        return Err(DownloadError::RetriesExhausted {
                            name: file.name.clone(),
                            attempts: disconnects,
                        }
                        .into());
                    }
                    warn!(
                        remote = %file.name,
                        reason = %reason,
                        disconnects,
                        backoff_ms = self.policy.backoff.as_millis() as u64,
                        "camera disconnected, reconnecting"
                    );
                    self.relogin(session).await?;
                }
            }
        }
    }

    /// Replace the session and log in again, retrying until it succeeds
    async fn relogin(&self, session: &mut DownloadSession) -> Result<()> {
        let mut attempts = 0u32;

        loop {
            session.reconnect(self.connector.as_ref()).await;
            self.policy.wait(&self.shutdown).await?;
            attempts += 1;

            match session.login().await {
                Ok(true) => {
                    info!(attempts, "logged in again");
                    return Ok(());
                }
                Ok(false) => warn!(attempts, "camera still unreachable"),
                Err(e) => warn!(attempts, error = %e, "re-login failed"),
            }

            if !self.policy.allows(attempts) {
                session.close().await;
                return Err(Error::LoginRetriesExhausted { attempts });
            }
        }
    }
}
