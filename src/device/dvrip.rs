//! TCP client for DVRIP ("Sofia") cameras

use super::codec::{self, FrameHeader, HEADER_LEN, msg};
use super::commands::{RET_OK, RET_OK_CHANGE_PASSWORD, ret_code};
use super::{DeviceClient, DeviceConnector, DeviceResult, DownloadSink};
use crate::config::CameraConfig;
use crate::error::DeviceError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Client for one DVRIP connection
///
/// The TCP connection is opened lazily by [`DeviceClient::login`].
pub struct DvripClient {
    camera: CameraConfig,
    stream: Option<TcpStream>,
    session: u32,
    sequence: u32,
}

impl DvripClient {
    /// Create an unconnected client
    pub fn new(camera: CameraConfig) -> Self {
        Self {
            camera,
            stream: None,
            session: 0,
            sequence: 0,
        }
    }

    fn io_timeout(&self) -> Duration {
        self.camera.io_timeout
    }

    async fn write_request(&mut self, code: u16, mut payload: Value) -> DeviceResult<()> {
        if code != msg::LOGIN
            && let Value::Object(map) = &mut payload
        {
            map.insert(
                "SessionID".to_string(),
                Value::String(codec::format_session_id(self.session)),
            );
        }

        let frame = codec::encode_request(self.session, self.sequence, code, &payload)?;
        self.sequence = self.sequence.wrapping_add(1);

        let io_timeout = self.io_timeout();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DeviceError::Disconnected("not connected".into()))?;

        debug!(code, len = frame.len(), "sending DVRIP request");
        match timeout(io_timeout, stream.write_all(&frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(classify_io(e)),
            Err(_) => Err(DeviceError::Disconnected("write timed out".into())),
        }
    }

    async fn read_frame(&mut self) -> DeviceResult<(FrameHeader, Vec<u8>)> {
        let io_timeout = self.io_timeout();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DeviceError::Disconnected("not connected".into()))?;

        let mut head = [0u8; HEADER_LEN];
        read_exact_timed(stream, &mut head, io_timeout).await?;
        let header = FrameHeader::decode(&head)?;

        let mut body = vec![0u8; header.length as usize];
        read_exact_timed(stream, &mut body, io_timeout).await?;
        Ok((header, body))
    }

    async fn read_json_reply(&mut self) -> DeviceResult<Option<Value>> {
        let (header, body) = self.read_frame().await?;
        if body.is_empty() {
            return Ok(None);
        }
        let reply = codec::decode_json(&body)?;
        debug!(code = header.message_id, ret = ?ret_code(&reply), "DVRIP reply");
        Ok(Some(reply))
    }

    async fn stream_media(&mut self, sink: &mut DownloadSink<'_>) -> DeviceResult<u64> {
        let mut written = 0u64;
        loop {
            let (header, body) = self.read_frame().await?;
            if header.message_id != msg::MEDIA_DATA {
                debug!(code = header.message_id, "ignoring frame during download");
                continue;
            }
            if body.is_empty() {
                sink.flush().await?;
                return Ok(written);
            }
            sink.write_all(&body).await?;
            written += body.len() as u64;
        }
    }
}

#[async_trait]
impl DeviceClient for DvripClient {
    async fn login(&mut self) -> DeviceResult<bool> {
        if self.stream.is_none() {
            let address = (self.camera.host.as_str(), self.camera.port);
            match timeout(self.io_timeout(), TcpStream::connect(address)).await {
                Ok(Ok(stream)) => self.stream = Some(stream),
                Ok(Err(e)) => {
                    warn!(host = %self.camera.host, error = %e, "could not connect to camera");
                    return Ok(false);
                }
                Err(_) => {
                    warn!(host = %self.camera.host, "connection to camera timed out");
                    return Ok(false);
                }
            }
            self.session = 0;
            self.sequence = 0;
        }

        let payload = json!({
            "EncryptType": "MD5",
            "LoginType": "DVRIP-Web",
            "PassWord": codec::sofia_hash(&self.camera.password),
            "UserName": self.camera.user,
        });
        self.write_request(msg::LOGIN, payload).await?;

        let Some(reply) = self.read_json_reply().await? else {
            return Ok(false);
        };

        match ret_code(&reply) {
            Some(RET_OK) | Some(RET_OK_CHANGE_PASSWORD) => {
                self.session = reply
                    .get("SessionID")
                    .and_then(Value::as_str)
                    .and_then(codec::parse_session_id)
                    .ok_or_else(|| {
                        DeviceError::Protocol("login reply without SessionID".into())
                    })?;
                debug!(session = self.session, "logged in");
                Ok(true)
            }
            status => Err(DeviceError::AuthenticationFailed(format!(
                "device returned status {status:?}"
            ))),
        }
    }

    async fn logout(&mut self) -> DeviceResult<()> {
        if self.stream.is_none() {
            return Ok(());
        }
        self.write_request(msg::LOGOUT, json!({ "Name": "" })).await?;
        // Some firmware closes the socket instead of replying.
        match self.read_json_reply().await {
            Ok(_) | Err(DeviceError::Disconnected(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.session = 0;
    }

    async fn send(&mut self, code: u16, payload: Value) -> DeviceResult<Option<Value>> {
        self.write_request(code, payload).await?;
        self.read_json_reply().await
    }

    async fn send_download(
        &mut self,
        channel: u8,
        code: u16,
        payload: Value,
        sink: &mut DownloadSink<'_>,
    ) -> DeviceResult<Option<u64>> {
        debug!(channel, code, "starting binary download");
        self.write_request(code, payload).await?;

        let ack = match self.read_json_reply().await {
            Ok(ack) => ack,
            Err(DeviceError::Disconnected(reason)) => {
                warn!(%reason, "camera disconnected before download acknowledgement");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if let Some(ack) = &ack
            && ret_code(ack).is_some_and(|ret| ret != RET_OK)
        {
            return Err(DeviceError::Protocol(format!(
                "download start rejected with status {:?}",
                ret_code(ack)
            )));
        }

        match self.stream_media(sink).await {
            Ok(written) => Ok(Some(written)),
            Err(DeviceError::Disconnected(reason)) => {
                warn!(%reason, "camera disconnected mid-transfer");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

async fn read_exact_timed(
    stream: &mut TcpStream,
    buf: &mut [u8],
    io_timeout: Duration,
) -> DeviceResult<()> {
    match timeout(io_timeout, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(classify_io(e)),
        Err(_) => Err(DeviceError::Disconnected("read timed out".into())),
    }
}

/// Connection-class failures mean the camera went away
fn classify_io(e: std::io::Error) -> DeviceError {
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe
        | ErrorKind::TimedOut => DeviceError::Disconnected(e.to_string()),
        _ => DeviceError::Io(e),
    }
}

/// Builds [`DvripClient`]s for the configured camera
#[derive(Clone)]
pub struct DvripConnector {
    camera: CameraConfig,
}

impl DvripConnector {
    /// Create a connector for `camera`
    pub fn new(camera: CameraConfig) -> Self {
        Self { camera }
    }
}

impl DeviceConnector for DvripConnector {
    fn new_client(&self) -> Box<dyn DeviceClient> {
        Box::new(DvripClient::new(self.camera.clone()))
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.camera.host, self.camera.port)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn camera(port: u16) -> CameraConfig {
        CameraConfig {
            host: "127.0.0.1".into(),
            port,
            user: "admin".into(),
            password: String::new(),
            io_timeout: Duration::from_secs(2),
        }
    }

    async fn read_request(socket: &mut TcpStream) -> (FrameHeader, Value) {
        let mut head = [0u8; HEADER_LEN];
        socket.read_exact(&mut head).await.unwrap();
        let header = FrameHeader::decode(&head).unwrap();
        let mut body = vec![0u8; header.length as usize];
        socket.read_exact(&mut body).await.unwrap();
        (header, codec::decode_json(&body).unwrap())
    }

    async fn write_frame(socket: &mut TcpStream, message_id: u16, body: &[u8]) {
        let header = FrameHeader {
            session: 0x0A,
            sequence: 0,
            message_id,
            length: body.len() as u32,
        };
        socket.write_all(&header.encode()).await.unwrap();
        socket.write_all(body).await.unwrap();
    }

    async fn write_json(socket: &mut TcpStream, message_id: u16, value: Value) {
        let mut body = serde_json::to_vec(&value).unwrap();
        body.extend_from_slice(codec::JSON_TERMINATOR);
        write_frame(socket, message_id, &body).await;
    }

    async fn accept_login(socket: &mut TcpStream) {
        let (header, request) = read_request(socket).await;
        assert_eq!(header.message_id, msg::LOGIN);
        assert_eq!(request["PassWord"], "tlJwpbo6");
        assert_eq!(request["UserName"], "admin");
        write_json(
            socket,
            msg::LOGIN + 1,
            json!({"Ret": 100, "SessionID": "0x0000000A", "AliveInterval": 20}),
        )
        .await;
    }

    #[tokio::test]
    async fn login_and_send_carry_session_id() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            accept_login(&mut socket).await;

            let (header, request) = read_request(&mut socket).await;
            assert_eq!(header.message_id, msg::SYSTEM_INFO);
            assert_eq!(header.session, 0x0A);
            assert_eq!(request["SessionID"], "0x0000000A");
            write_json(
                &mut socket,
                msg::SYSTEM_INFO + 1,
                json!({"Ret": 100, "SystemInfo": {"SerialNo": "x"}}),
            )
            .await;
        });

        let mut client = DvripClient::new(camera(port));
        assert!(client.login().await.unwrap());
        let reply = client
            .send(msg::SYSTEM_INFO, json!({"Name": "SystemInfo"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply["SystemInfo"]["SerialNo"], "x");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_login_is_authentication_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = read_request(&mut socket).await;
            write_json(&mut socket, msg::LOGIN + 1, json!({"Ret": 203})).await;
        });

        let mut client = DvripClient::new(camera(port));
        let err = client.login().await.unwrap_err();
        assert!(matches!(err, DeviceError::AuthenticationFailed(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_device_reports_false() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client = DvripClient::new(camera(port));
        assert!(!client.login().await.unwrap());
    }

    #[tokio::test]
    async fn download_streams_media_frames_until_terminator() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            accept_login(&mut socket).await;
            let (header, _) = read_request(&mut socket).await;
            assert_eq!(header.message_id, msg::PLAYBACK);
            write_json(&mut socket, msg::PLAYBACK_ACK, json!({"Ret": 100})).await;
            write_frame(&mut socket, msg::MEDIA_DATA, b"hello ").await;
            write_frame(&mut socket, msg::MEDIA_DATA, b"camera").await;
            write_frame(&mut socket, msg::MEDIA_DATA, b"").await;
        });

        let mut client = DvripClient::new(camera(port));
        assert!(client.login().await.unwrap());

        let mut sink = Vec::new();
        let written = client
            .send_download(0, msg::PLAYBACK, json!({"Name": "OPPlayBack"}), &mut sink)
            .await
            .unwrap();
        assert_eq!(written, Some(12));
        assert_eq!(sink, b"hello camera");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn download_reports_disconnect_mid_transfer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            accept_login(&mut socket).await;
            let _ = read_request(&mut socket).await;
            write_json(&mut socket, msg::PLAYBACK_ACK, json!({"Ret": 100})).await;
            write_frame(&mut socket, msg::MEDIA_DATA, b"partial").await;
            // socket dropped without the terminating frame
        });

        let mut client = DvripClient::new(camera(port));
        assert!(client.login().await.unwrap());

        let mut sink = Vec::new();
        let written = client
            .send_download(0, msg::PLAYBACK, json!({"Name": "OPPlayBack"}), &mut sink)
            .await
            .unwrap();
        assert_eq!(written, None);
        assert_eq!(sink, b"partial");
        server.await.unwrap();
    }

    #[test]
    fn connection_errors_classify_as_disconnect() {
        let eof = std::io::Error::new(ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(classify_io(eof), DeviceError::Disconnected(_)));
        let denied = std::io::Error::new(ErrorKind::PermissionDenied, "nope");
        assert!(matches!(classify_io(denied), DeviceError::Io(_)));
    }
}
