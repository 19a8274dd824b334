//! Core types for dvrip-dl

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Timestamp format used by the device and by the configured time range
pub const DEVICE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of media stored on the device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Raw H.264 recordings, converted after download
    Video,
    /// JPEG snapshots, stored as downloaded
    Picture,
}

impl MediaKind {
    /// The `Type` value used in the device's file query
    pub fn query_type(&self) -> &'static str {
        match self {
            MediaKind::Video => "h264",
            MediaKind::Picture => "jpg",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Picture => write!(f, "picture"),
        }
    }
}

/// One recording or picture on the camera's storage
///
/// Identity is `name`; two entries with the same name describe the same file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFile {
    /// Path-like name reported by the device
    pub name: String,
    /// Media kind the file was listed under
    pub kind: MediaKind,
    /// Recording start
    pub begin_time: NaiveDateTime,
    /// Recording end
    pub end_time: NaiveDateTime,
}

/// Result of a single download attempt
#[derive(Debug)]
pub enum DownloadOutcome {
    /// The payload was fully received and written
    Success {
        /// Number of bytes written to the target
        bytes: u64,
    },
    /// The camera dropped the connection; the same file should be retried
    Disconnected {
        /// What the transport reported
        reason: String,
    },
    /// The attempt failed in a way retrying will not fix
    Fatal(Error),
}

/// Informational device state, logged at the start of each cycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Device serial number
    pub serial: Option<String>,
    /// Firmware build
    pub firmware: Option<String>,
    /// Battery charge, only reported by battery firmware builds
    pub battery_percent: Option<u8>,
    /// Storage capacity in megabytes, summed over partitions
    pub storage_total_mb: Option<u64>,
    /// Free storage in megabytes, summed over partitions
    pub storage_free_mb: Option<u64>,
}

/// Top-level action selected by configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Scheduled download loop
    #[default]
    Download,
    /// Single pan/tilt step
    #[serde(alias = "move-camera")]
    Move,
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" => Ok(Action::Download),
            "move" | "move-camera" => Ok(Action::Move),
            other => Err(Error::config(
                "ACTION",
                format!("unknown action {other:?}, expected \"download\" or \"move\""),
            )),
        }
    }
}

/// Pan/tilt direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Tilt up
    Up,
    /// Tilt down
    Down,
    /// Pan left
    Left,
    /// Pan right
    Right,
}

impl Direction {
    /// The `Command` value understood by `OPPTZControl`
    pub fn command(&self) -> &'static str {
        match self {
            Direction::Up => "DirectionUp",
            Direction::Down => "DirectionDown",
            Direction::Left => "DirectionLeft",
            Direction::Right => "DirectionRight",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.strip_prefix("direction").unwrap_or(&lower) {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            _ => Err(Error::config(
                "DIRECTION",
                format!("unknown direction {s:?}, expected Up, Down, Left or Right"),
            )),
        }
    }
}

/// Serde helper for device timestamps (`YYYY-MM-DD HH:MM:SS`)
pub(crate) mod device_time {
    use super::DEVICE_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(raw.trim(), DEVICE_TIME_FORMAT)
            .map_err(serde::de::Error::custom)
    }
}

/// Format a timestamp the way the device expects it
pub fn format_device_time(time: &NaiveDateTime) -> String {
    time.format(DEVICE_TIME_FORMAT).to_string()
}
