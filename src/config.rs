//! Configuration types for dvrip-dl
//!
//! Configuration is assembled from three layers, lowest precedence first:
//! built-in defaults, an optional JSON file named by `CONFIG_FILE`, and
//! environment variables. [`Config::validate`] then checks that everything
//! the selected action needs is present.

use crate::error::{Error, Result};
use crate::types::{Action, DEVICE_TIME_FORMAT, Direction, MediaKind};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Camera connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera host name or IP address
    #[serde(default)]
    pub host: String,

    /// DVRIP TCP port (default: 34567)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user
    #[serde(default)]
    pub user: String,

    /// Login password (may be empty)
    #[serde(default)]
    pub password: String,

    /// Timeout for a single socket read or write (default: 30 seconds)
    #[serde(default = "default_io_timeout", with = "duration_serde")]
    pub io_timeout: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            user: String::new(),
            password: String::new(),
            io_timeout: default_io_timeout(),
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for CameraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

/// What to download and where to put it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Start of the recording window
    #[serde(default, with = "optional_time_serde")]
    pub start_time: Option<NaiveDateTime>,

    /// End of the recording window (None = "now" at the start of each cycle)
    #[serde(default, with = "optional_time_serde")]
    pub end_time: Option<NaiveDateTime>,

    /// Directory for videos
    #[serde(default)]
    pub video_dir: PathBuf,

    /// Directory for pictures (defaults to `video_dir`)
    #[serde(default)]
    pub picture_dir: Option<PathBuf>,

    /// Container extension videos are converted to, with leading dot (e.g. ".mp4")
    #[serde(default)]
    pub target_format: String,

    /// Skip list location (defaults to `<video_dir>/skip-list.json`)
    #[serde(default)]
    pub skip_list_file: Option<PathBuf>,

    /// Media kinds to fetch, in processing order (default: video, picture)
    #[serde(default = "default_kinds")]
    pub kinds: Vec<MediaKind>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            video_dir: PathBuf::new(),
            picture_dir: None,
            target_format: String::new(),
            skip_list_file: None,
            kinds: default_kinds(),
        }
    }
}

impl DownloadConfig {
    /// Directory a media kind is stored in
    pub fn dir_for(&self, kind: MediaKind) -> &Path {
        match kind {
            MediaKind::Video => self.video_dir.as_path(),
            MediaKind::Picture => self.picture_dir.as_deref().unwrap_or(&self.video_dir),
        }
    }

    /// Resolved skip list path
    pub fn skip_list_path(&self) -> PathBuf {
        self.skip_list_file
            .clone()
            .unwrap_or_else(|| self.video_dir.join("skip-list.json"))
    }
}

/// External transcoder settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Path to the ffmpeg executable (auto-detected on PATH if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Frame rate hint passed to the transcoder (default: 15)
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            frame_rate: default_frame_rate(),
        }
    }
}

/// Retry behavior for logins and dropped downloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Fixed delay between attempts (default: 2 seconds)
    #[serde(default = "default_backoff", with = "duration_serde")]
    pub backoff: Duration,

    /// Maximum login attempts per cycle before the process gives up (default: 10)
    #[serde(default = "default_login_max_attempts")]
    pub login_max_attempts: u32,

    /// Cap on reconnects for a single file (None = retry forever, the default)
    #[serde(default)]
    pub download_max_attempts: Option<u32>,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff: default_backoff(),
            login_max_attempts: default_login_max_attempts(),
            download_max_attempts: None,
            jitter: false,
        }
    }
}

/// Scheduling of download cycles
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Pause between cycles (default: 3600 seconds)
    #[serde(default = "default_cooldown", with = "duration_serde")]
    pub cooldown: Duration,

    /// Run a single cycle and exit
    #[serde(default)]
    pub run_once: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown(),
            run_once: false,
        }
    }
}

/// Pan/tilt step for the `move` action
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MoveConfig {
    /// Direction to move in
    #[serde(default)]
    pub direction: Option<Direction>,

    /// Step magnitude (default: 5)
    #[serde(default = "default_step")]
    pub step: u32,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            direction: None,
            step: default_step(),
        }
    }
}

/// Main configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Selected action
    #[serde(default)]
    pub action: Action,

    /// Camera connection
    #[serde(default)]
    pub camera: CameraConfig,

    /// Download window and directories
    #[serde(default)]
    pub download: DownloadConfig,

    /// Transcoder settings
    #[serde(default)]
    pub convert: ConvertConfig,

    /// Retry behavior
    #[serde(default)]
    pub retry: RetryConfig,

    /// Cycle scheduling
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Camera movement
    #[serde(default, rename = "move")]
    pub movement: MoveConfig,
}

impl Config {
    /// Build the configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a value cannot be parsed or a required
    /// setting is missing.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    ///
    /// Reads `CONFIG_FILE` (if set) as the base layer, applies the remaining
    /// variables on top and validates the result.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match non_empty(&lookup, "CONFIG_FILE") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| {
            Error::config(
                "CONFIG_FILE",
                format!("cannot read {}: {e}", path.display()),
            )
        })?;
        serde_json::from_slice(&raw).map_err(|e| {
            Error::config(
                "CONFIG_FILE",
                format!("invalid config file {}: {e}", path.display()),
            )
        })
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(action) = parse_var::<Action, _>(lookup, "ACTION")? {
            self.action = action;
        }

        if let Some(host) = non_empty(lookup, "IP_ADDRESS") {
            self.camera.host = host;
        }
        if let Some(port) = parse_var(lookup, "CAMERA_PORT")? {
            self.camera.port = port;
        }
        if let Some(user) = non_empty(lookup, "CAMERA_USER") {
            self.camera.user = user;
        }
        if let Some(password) = lookup("CAMERA_PASSWORD") {
            self.camera.password = password;
        }
        if let Some(secs) = parse_var(lookup, "CAMERA_TIMEOUT_SECONDS")? {
            self.camera.io_timeout = Duration::from_secs(secs);
        }

        if let Some(start) = non_empty(lookup, "DOWNLOAD_START_TIME") {
            self.download.start_time = Some(parse_time("DOWNLOAD_START_TIME", &start)?);
        }
        if let Some(end) = non_empty(lookup, "DOWNLOAD_END_TIME") {
            self.download.end_time = Some(parse_time("DOWNLOAD_END_TIME", &end)?);
        }
        if let Some(dir) = non_empty(lookup, "DOWNLOAD_DIR") {
            self.download.video_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty(lookup, "PICTURE_DIR") {
            self.download.picture_dir = Some(PathBuf::from(dir));
        }
        if let Some(format) = non_empty(lookup, "MOVIE_TARGET_FORMAT") {
            self.download.target_format = format;
        }
        if let Some(path) = non_empty(lookup, "SKIP_LIST_FILE") {
            self.download.skip_list_file = Some(PathBuf::from(path));
        }
        if let Some(kinds) = non_empty(lookup, "MEDIA_KINDS") {
            self.download.kinds = parse_kinds(&kinds)?;
        }
        if !self.download.target_format.is_empty() && !self.download.target_format.starts_with('.')
        {
            self.download.target_format = format!(".{}", self.download.target_format);
        }

        if let Some(path) = non_empty(lookup, "FFMPEG_PATH") {
            self.convert.ffmpeg_path = Some(PathBuf::from(path));
        }
        if let Some(rate) = parse_var(lookup, "FRAME_RATE")? {
            self.convert.frame_rate = rate;
        }

        if let Some(secs) = parse_var(lookup, "RETRY_BACKOFF_SECONDS")? {
            self.retry.backoff = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_var(lookup, "LOGIN_MAX_ATTEMPTS")? {
            self.retry.login_max_attempts = attempts;
        }
        if let Some(attempts) = parse_var(lookup, "DOWNLOAD_MAX_ATTEMPTS")? {
            self.retry.download_max_attempts = Some(attempts);
        }
        if let Some(flag) = non_empty(lookup, "RETRY_JITTER") {
            self.retry.jitter = parse_flag("RETRY_JITTER", &flag)?;
        }

        if let Some(secs) = parse_var(lookup, "COOLDOWN_SECONDS")? {
            self.schedule.cooldown = Duration::from_secs(secs);
        }
        if let Some(flag) = non_empty(lookup, "RUN_ONCE") {
            self.schedule.run_once = parse_flag("RUN_ONCE", &flag)?;
        }

        if let Some(direction) = parse_var::<Direction, _>(lookup, "DIRECTION")? {
            self.movement.direction = Some(direction);
        }
        let step = match parse_var(lookup, "STEP")? {
            Some(step) => Some(step),
            None => parse_var(lookup, "SPEED")?,
        };
        if let Some(step) = step {
            self.movement.step = step;
        }

        Ok(())
    }

    /// Check that every setting the selected action needs is present
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing or inconsistent key.
    pub fn validate(&self) -> Result<()> {
        if self.camera.host.trim().is_empty() {
            return Err(Error::config("IP_ADDRESS", "camera address is required"));
        }
        if self.camera.user.trim().is_empty() {
            return Err(Error::config("CAMERA_USER", "camera user is required"));
        }
        if self.retry.login_max_attempts == 0 {
            return Err(Error::config(
                "LOGIN_MAX_ATTEMPTS",
                "at least one login attempt is required",
            ));
        }

        match self.action {
            Action::Download => {
                let Some(start) = self.download.start_time else {
                    return Err(Error::config(
                        "DOWNLOAD_START_TIME",
                        "download start time is required",
                    ));
                };
                if let Some(end) = self.download.end_time
                    && end < start
                {
                    return Err(Error::config(
                        "DOWNLOAD_END_TIME",
                        "download end time is before the start time",
                    ));
                }
                if self.download.video_dir.as_os_str().is_empty() {
                    return Err(Error::config("DOWNLOAD_DIR", "download directory is required"));
                }
                if self.download.target_format.is_empty() {
                    return Err(Error::config(
                        "MOVIE_TARGET_FORMAT",
                        "target video format is required",
                    ));
                }
                if self.download.kinds.is_empty() {
                    return Err(Error::config("MEDIA_KINDS", "no media kinds selected"));
                }
            }
            Action::Move => {
                if self.movement.direction.is_none() {
                    return Err(Error::config(
                        "DIRECTION",
                        "direction is required for the move action",
                    ));
                }
            }
        }

        Ok(())
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| Error::config(key, format!("invalid value {raw:?}: {e}")))
        })
        .transpose()
}

fn parse_time(key: &str, raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DEVICE_TIME_FORMAT).map_err(|e| {
        Error::config(
            key,
            format!("invalid time {raw:?} (expected YYYY-MM-DD HH:MM:SS): {e}"),
        )
    })
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(key, format!("invalid flag {raw:?}"))),
    }
}

fn parse_kinds(raw: &str) -> Result<Vec<MediaKind>> {
    let mut kinds = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let kind = match part.to_ascii_lowercase().as_str() {
            "video" | "h264" => MediaKind::Video,
            "picture" | "jpg" => MediaKind::Picture,
            _ => {
                return Err(Error::config(
                    "MEDIA_KINDS",
                    format!("unknown media kind {part:?}"),
                ));
            }
        };
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

fn default_port() -> u16 {
    34567
}

fn default_io_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_kinds() -> Vec<MediaKind> {
    vec![MediaKind::Video, MediaKind::Picture]
}

fn default_frame_rate() -> u32 {
    15
}

fn default_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_login_max_attempts() -> u32 {
    10
}

fn default_cooldown() -> Duration {
    Duration::from_secs(3600)
}

fn default_step() -> u32 {
    5
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional timestamp helper in device format
mod optional_time_serde {
    use crate::types::DEVICE_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => serializer.serialize_some(&t.format(DEVICE_TIME_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| {
                NaiveDateTime::parse_from_str(&raw, DEVICE_TIME_FORMAT)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
