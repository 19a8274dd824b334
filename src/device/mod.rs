//! Device protocol collaborator
//!
//! The downloader only depends on the [`DeviceClient`] contract: login,
//! logout, close, a generic JSON request and a binary download request.
//! [`DvripClient`] implements it over TCP for DVRIP/"Sofia" cameras.
//! Reconnecting means asking a [`DeviceConnector`] for a fresh client and
//! dropping the old one.

pub mod codec;
pub mod commands;
mod dvrip;

pub use dvrip::{DvripClient, DvripConnector};

use crate::error::DeviceError;
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWrite;

/// Result type for device operations
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Sink a media download is streamed into
pub type DownloadSink<'a> = dyn AsyncWrite + Unpin + Send + 'a;

/// One authenticated connection to a camera
#[async_trait]
pub trait DeviceClient: Send {
    /// Connect (if needed) and authenticate
    ///
    /// Returns `Ok(false)` when the device could not be reached and
    /// `Err(DeviceError::AuthenticationFailed)` when it refused the handshake.
    async fn login(&mut self) -> DeviceResult<bool>;

    /// End the authenticated session
    async fn logout(&mut self) -> DeviceResult<()>;

    /// Drop the underlying connection; the client is unusable afterwards
    async fn close(&mut self);

    /// Send a control message and wait for its JSON reply
    ///
    /// `Ok(None)` means the device produced no reply.
    async fn send(&mut self, code: u16, payload: Value) -> DeviceResult<Option<Value>>;

    /// Request a binary stream and write it into `sink`
    ///
    /// Returns `Ok(Some(bytes))` when the stream ended normally and
    /// `Ok(None)` when the device disconnected before the end of the stream.
    async fn send_download(
        &mut self,
        channel: u8,
        code: u16,
        payload: Value,
        sink: &mut DownloadSink<'_>,
    ) -> DeviceResult<Option<u64>>;
}

/// Factory for fresh, not yet authenticated clients
pub trait DeviceConnector: Send + Sync {
    /// Construct a new client for the configured device
    fn new_client(&self) -> Box<dyn DeviceClient>;

    /// Address used in log messages
    fn describe(&self) -> String;
}
