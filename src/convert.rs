//! Video conversion through an external transcoder
//!
//! Downloaded H.264 elementary streams are remuxed into the target container
//! without re-encoding. The raw source is deleted after every conversion
//! attempt, whether or not the transcoder succeeded: free space on the
//! download disk takes priority over keeping sources of failed conversions.

use crate::config::ConvertConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Outcome of one conversion attempt
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionResult {
    /// Whether the transcoder reported success
    pub success: bool,
    /// Whether the source file was removed afterwards
    pub source_deleted: bool,
}

/// Converts a completed download into the target container
#[async_trait]
pub trait MediaConverter: Send + Sync {
    /// Convert `source` into `target`, then delete `source`
    ///
    /// Transcoder failures are reported in the result, not as errors; the
    /// caller logs them and moves on.
    async fn convert(&self, source: &Path, target: &Path) -> ConversionResult;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Converter running the `ffmpeg` binary in stream-copy mode
///
/// # Examples
///
/// ```no_run
/// use dvrip_dl::convert::{FfmpegConverter, MediaConverter};
/// use std::path::{Path, PathBuf};
///
/// # #[tokio::main]
/// # async fn main() {
/// let converter = FfmpegConverter::new(PathBuf::from("/usr/bin/ffmpeg"), 15);
/// let result = converter
///     .convert(Path::new("cam/2023-04-01_08-15-00.h264"), Path::new("cam/2023-04-01_08-15-00.mp4"))
///     .await;
/// println!("converted: {}", result.success);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    binary_path: PathBuf,
    frame_rate: u32,
}

impl FfmpegConverter {
    /// Create a converter with an explicit binary path
    pub fn new(binary_path: PathBuf, frame_rate: u32) -> Self {
        Self {
            binary_path,
            frame_rate,
        }
    }

    /// Attempt to find ffmpeg in PATH
    pub fn from_path(frame_rate: u32) -> Option<Self> {
        which::which("ffmpeg")
            .ok()
            .map(|path| Self::new(path, frame_rate))
    }

    /// Build from configuration, searching PATH when no binary is configured
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no path is configured and ffmpeg is not
    /// on PATH. Starting without a transcoder would delete every raw
    /// download after a failed conversion.
    pub fn from_config(config: &ConvertConfig) -> Result<Self> {
        match &config.ffmpeg_path {
            Some(path) => Ok(Self::new(path.clone(), config.frame_rate)),
            None => Self::from_path(config.frame_rate).ok_or_else(|| {
                Error::config("FFMPEG_PATH", "ffmpeg not found in PATH and FFMPEG_PATH not set")
            }),
        }
    }

    /// Path of the transcoder binary
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    async fn run(&self, source: &Path, target: &Path) -> Result<()> {
        let status = Command::new(&self.binary_path)
            .arg("-nostdin")
            .arg("-framerate")
            .arg(self.frame_rate.to_string())
            .arg("-i")
            .arg(source)
            .arg("-c")
            .arg("copy")
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute ffmpeg: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::ExternalTool(format!("ffmpeg exited with {status}")))
        }
    }
}

#[async_trait]
impl MediaConverter for FfmpegConverter {
    async fn convert(&self, source: &Path, target: &Path) -> ConversionResult {
        let success = match self.run(source, target).await {
            Ok(()) => {
                info!(path = ?target, "file converted");
                true
            }
            Err(e) => {
                warn!(source = ?source, error = %e, "error converting video, check the source recording");
                false
            }
        };

        let source_deleted = match tokio::fs::remove_file(source).await {
            Ok(()) => {
                info!(path = ?source, "original file deleted");
                true
            }
            Err(e) => {
                warn!(path = ?source, error = %e, "failed to delete original file");
                false
            }
        };

        ConversionResult {
            success,
            source_deleted,
        }
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}
