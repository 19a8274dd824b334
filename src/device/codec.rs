//! DVRIP frame encoding and decoding
//!
//! Every message is a 20-byte little-endian header followed by a payload.
//! Control payloads are JSON terminated by `"\n\0"`; media payloads are raw.

use crate::error::DeviceError;
use serde_json::Value;

/// Size of the fixed frame header
pub const HEADER_LEN: usize = 20;

/// Bytes appended after every JSON payload
pub const JSON_TERMINATOR: &[u8] = b"\n\0";

/// Largest payload accepted from the device (guards against garbage lengths)
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

const HEAD_MAGIC: u8 = 0xFF;
const VERSION: u8 = 0;

/// Message ids used by the downloader
pub mod msg {
    /// Login request
    pub const LOGIN: u16 = 1000;
    /// Logout request
    pub const LOGOUT: u16 = 1002;
    /// System/storage information query
    pub const SYSTEM_INFO: u16 = 1020;
    /// Pan/tilt/zoom control
    pub const PTZ_CONTROL: u16 = 1400;
    /// Playback start/stop (and download start/stop)
    pub const PLAYBACK: u16 = 1420;
    /// Playback acknowledgement sent before media frames
    pub const PLAYBACK_ACK: u16 = 1421;
    /// Playback claim
    pub const PLAYBACK_CLAIM: u16 = 1424;
    /// Media data frame
    pub const MEDIA_DATA: u16 = 1426;
    /// Recorded file query
    pub const FILE_QUERY: u16 = 1440;
}

/// Fixed-size frame header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Session id assigned at login (0 before)
    pub session: u32,
    /// Per-connection sequence number
    pub sequence: u32,
    /// Message id
    pub message_id: u16,
    /// Payload length in bytes
    pub length: u32,
}

impl FrameHeader {
    /// Serialize to wire format
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = HEAD_MAGIC;
        buf[1] = VERSION;
        buf[4..8].copy_from_slice(&self.session.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sequence.to_le_bytes());
        buf[14..16].copy_from_slice(&self.message_id.to_le_bytes());
        buf[16..20].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Parse a header received from the device
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Protocol`] on a bad magic byte or an oversized
    /// payload length.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self, DeviceError> {
        if buf[0] != HEAD_MAGIC {
            return Err(DeviceError::Protocol(format!(
                "bad frame magic 0x{:02X}",
                buf[0]
            )));
        }
        let header = Self {
            session: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            sequence: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            message_id: u16::from_le_bytes([buf[14], buf[15]]),
            length: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
        };
        if header.length > MAX_PAYLOAD_LEN {
            return Err(DeviceError::Protocol(format!(
                "frame length {} exceeds limit",
                header.length
            )));
        }
        Ok(header)
    }
}

/// Encode a JSON request frame
pub fn encode_request(
    session: u32,
    sequence: u32,
    message_id: u16,
    payload: &Value,
) -> Result<Vec<u8>, DeviceError> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| DeviceError::Protocol(format!("failed to encode request: {e}")))?;
    let length = u32::try_from(body.len() + JSON_TERMINATOR.len())
        .map_err(|_| DeviceError::Protocol("request too large".into()))?;

    let header = FrameHeader {
        session,
        sequence,
        message_id,
        length,
    };

    let mut frame = Vec::with_capacity(HEADER_LEN + length as usize);
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(&body);
    frame.extend_from_slice(JSON_TERMINATOR);
    Ok(frame)
}

/// Decode a JSON payload, tolerating the trailing newline/NUL terminator
pub fn decode_json(body: &[u8]) -> Result<Value, DeviceError> {
    let end = body
        .iter()
        .rposition(|b| !matches!(b, b'\0' | b'\n' | b'\r' | b' '))
        .map_or(0, |i| i + 1);
    serde_json::from_slice(&body[..end])
        .map_err(|e| DeviceError::Protocol(format!("malformed JSON reply: {e}")))
}

/// DVRIP "sofia" password digest used by `EncryptType: MD5`
///
/// The MD5 digest is folded pairwise: each pair of bytes is summed and mapped
/// onto `[0-9A-Za-z]`, giving an 8-character string.
pub fn sofia_hash(password: &str) -> String {
    const CHARS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let digest = md5::compute(password.as_bytes());
    digest
        .chunks(2)
        .map(|pair| {
            let sum = pair.iter().map(|&b| b as usize).sum::<usize>();
            CHARS[sum % CHARS.len()] as char
        })
        .collect()
}

/// Format a session id the way requests carry it (`0x0000000A`)
pub fn format_session_id(session: u32) -> String {
    format!("0x{session:08X}")
}

/// Parse a `SessionID` value from a login reply
pub fn parse_session_id(value: &str) -> Option<u32> {
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))?;
    u32::from_str_radix(hex, 16).ok()
}
