//! Authenticated device session and single download attempts

use crate::device::codec::msg;
use crate::device::commands::{self, RET_OK, ret_code};
use crate::device::{DeviceClient, DeviceConnector};
use crate::error::{DownloadError, Error, Result};
use crate::retry::IsRetryable;
use crate::types::{DeviceStatus, Direction, DownloadOutcome, RemoteFile};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, warn};

/// Stream channel recordings are downloaded from
const DOWNLOAD_CHANNEL: u8 = 0;

/// The single live connection to the camera
///
/// Owned by the orchestrator. Reconnecting replaces the whole value; the old
/// client is closed and dropped.
pub struct DownloadSession {
    client: Box<dyn DeviceClient>,
}

impl DownloadSession {
    /// Wrap a fresh, not yet authenticated client
    pub fn new(client: Box<dyn DeviceClient>) -> Self {
        Self { client }
    }

    /// Open a session from a connector
    pub fn connect(connector: &dyn DeviceConnector) -> Self {
        Self::new(connector.new_client())
    }

    /// Authenticate; `Ok(false)` when the device could not be reached
    pub async fn login(&mut self) -> Result<bool> {
        Ok(self.client.login().await?)
    }

    /// End the authenticated session, logging failures
    pub async fn logout(&mut self) {
        if let Err(e) = self.client.logout().await {
            warn!(error = %e, "logout failed");
        }
    }

    /// Close the underlying connection
    pub async fn close(&mut self) {
        self.client.close().await;
    }

    /// Discard this connection and start over with a new client
    pub async fn reconnect(&mut self, connector: &dyn DeviceConnector) {
        self.client.close().await;
        *self = Self::connect(connector);
    }

    /// Raw client access for request/response helpers such as the file catalog
    pub fn client_mut(&mut self) -> &mut dyn DeviceClient {
        self.client.as_mut()
    }

    /// Query battery, firmware and storage information
    ///
    /// Purely informational: failures are logged and leave fields empty.
    pub async fn status(&mut self) -> DeviceStatus {
        let system = self.query_info("SystemInfo").await;
        let storage = self.query_info("StorageInfo").await;
        commands::parse_status(system.as_ref(), storage.as_ref())
    }

    async fn query_info(&mut self, name: &str) -> Option<serde_json::Value> {
        match self
            .client
            .send(msg::SYSTEM_INFO, commands::info_query(name))
            .await
        {
            Ok(Some(reply)) if ret_code(&reply) == Some(RET_OK) => Some(reply),
            Ok(reply) => {
                debug!(name, ret = ?reply.as_ref().and_then(ret_code), "info query not answered");
                None
            }
            Err(e) => {
                warn!(name, error = %e, "info query failed");
                None
            }
        }
    }

    /// Move the camera one step
    ///
    /// Sends a start command followed by a stop command. If the stop command
    /// is lost the motor keeps turning, so a failure there is reported.
    pub async fn ptz_step(&mut self, direction: Direction, step: u32) -> Result<()> {
        for stop in [false, true] {
            let reply = self
                .client
                .send(msg::PTZ_CONTROL, commands::ptz(direction, step, stop))
                .await?;
            if let Some(reply) = reply
                && ret_code(&reply).is_some_and(|ret| ret != RET_OK)
            {
                warn!(
                    direction = direction.command(),
                    stop,
                    ret = ?ret_code(&reply),
                    "camera rejected PTZ command"
                );
            }
        }
        info!(direction = direction.command(), step, "camera moved");
        Ok(())
    }

    /// Perform one download attempt of `file` into `target`
    ///
    /// Claims the playback context, streams the payload into `target`
    /// (creating parent directories), then releases the context. A dropped
    /// connection yields [`DownloadOutcome::Disconnected`]; anything else
    /// that goes wrong after the claim yields [`DownloadOutcome::Fatal`] and
    /// still releases the context. On every non-success path the partially
    /// written target is removed.
    pub async fn attempt(&mut self, file: &RemoteFile, target: &Path) -> DownloadOutcome {
        if let Some(outcome) = self.claim(file).await {
            return outcome;
        }

        let bytes = match self.stream_to(file, target).await {
            Ok(bytes) => bytes,
            Err(outcome) => {
                discard_partial(target).await;
                // A disconnected session is discarded; a live one must give the context back.
                if matches!(outcome, DownloadOutcome::Fatal(_)) {
                    self.release(file).await;
                }
                return outcome;
            }
        };

        self.release(file).await;
        info!(path = ?target, bytes, "file downloaded");
        DownloadOutcome::Success { bytes }
    }

    /// Open the playback context; `Some` carries a failed outcome
    async fn claim(&mut self, file: &RemoteFile) -> Option<DownloadOutcome> {
        let result = self
            .client
            .send(msg::PLAYBACK_CLAIM, commands::playback("Claim", file))
            .await;

        match result {
            Ok(Some(reply)) => match ret_code(&reply) {
                Some(ret) if ret != RET_OK => Some(DownloadOutcome::Fatal(
                    DownloadError::PlaybackRejected {
                        name: file.name.clone(),
                        action: "Claim".into(),
                        status: Some(ret),
                    }
                    .into(),
                )),
                _ => None,
            },
            Ok(None) => Some(DownloadOutcome::Disconnected {
                reason: "no reply to playback claim".into(),
            }),
            Err(e) => Some(classify(e.into())),
        }
    }

    async fn stream_to(
        &mut self,
        file: &RemoteFile,
        target: &Path,
    ) -> std::result::Result<u64, DownloadOutcome> {
        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadOutcome::Fatal(e.into()))?;
        }

        info!(path = ?target, remote = %file.name, "downloading");
        let handle = fs::File::create(target)
            .await
            .map_err(|e| DownloadOutcome::Fatal(e.into()))?;
        let mut writer = BufWriter::new(handle);

        let result = self
            .client
            .send_download(
                DOWNLOAD_CHANNEL,
                msg::PLAYBACK,
                commands::playback("DownloadStart", file),
                &mut writer,
            )
            .await;

        match result {
            Ok(Some(0)) => Err(DownloadOutcome::Fatal(
                DownloadError::EmptyPayload {
                    name: file.name.clone(),
                }
                .into(),
            )),
            Ok(Some(bytes)) => {
                writer
                    .flush()
                    .await
                    .map_err(|e| DownloadOutcome::Fatal(e.into()))?;
                Ok(bytes)
            }
            Ok(None) => Err(DownloadOutcome::Disconnected {
                reason: "stream ended before completion".into(),
            }),
            Err(e) => Err(classify(e.into())),
        }
    }

    /// Close the playback context; the file is already complete at this point
    async fn release(&mut self, file: &RemoteFile) {
        if let Err(e) = self
            .client
            .send(msg::PLAYBACK, commands::playback("DownloadStop", file))
            .await
        {
            warn!(remote = %file.name, error = %e, "failed to release playback context");
        }
    }
}

fn classify(e: Error) -> DownloadOutcome {
    if e.is_retryable() {
        DownloadOutcome::Disconnected {
            reason: e.to_string(),
        }
    } else {
        DownloadOutcome::Fatal(e)
    }
}

/// Remove a partially written target
async fn discard_partial(target: &Path) {
    match fs::remove_file(target).await {
        Ok(()) => debug!(path = ?target, "removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => error!(path = ?target, error = %e, "failed to remove partial download"),
    }
}
