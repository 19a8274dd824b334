//! Local target path derivation for remote recordings

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Minimum number of `/`-separated segments a remote name must have
const MIN_SEGMENTS: usize = 6;

/// Segment holding the disk/date directory
const DISK_SEGMENT: usize = 3;

/// Segment whose first characters hold the recording start (`HH.MM.SS`)
const TIME_SEGMENT: usize = 5;

/// Number of characters taken from the time segment
const TIME_PREFIX_LEN: usize = 8;

/// Derive the local path a remote file is stored under
///
/// The flat filename token is `<segment 3>_<first 8 chars of segment 5>` with
/// every `.` replaced by `-`, so the only dot left in the name is the one that
/// starts the extension. The extension is `output_extension` when given and
/// non-empty, otherwise the remote file's own extension.
///
/// Pure and deterministic: no filesystem access.
///
/// # Errors
///
/// Returns [`Error::InvalidRemoteName`] when the remote name has fewer than
/// six path segments.
///
/// # Examples
///
/// ```
/// use dvrip_dl::naming::derive_target_path;
/// use std::path::Path;
///
/// let name = "/mnt/sd/2023-04-01/001/08.15.00-08.20.00[R][@5a2][0].h264";
/// let raw = derive_target_path(name, Path::new("downloads"), None).unwrap();
/// assert_eq!(raw, Path::new("downloads/2023-04-01_08-15-00.h264"));
///
/// let mp4 = derive_target_path(name, Path::new("downloads"), Some(".mp4")).unwrap();
/// assert_eq!(mp4, Path::new("downloads/2023-04-01_08-15-00.mp4"));
/// ```
pub fn derive_target_path(
    remote_name: &str,
    download_dir: &Path,
    output_extension: Option<&str>,
) -> Result<PathBuf> {
    let segments: Vec<&str> = remote_name.split('/').collect();
    if segments.len() < MIN_SEGMENTS {
        return Err(Error::InvalidRemoteName {
            name: remote_name.to_string(),
            reason: format!(
                "expected at least {MIN_SEGMENTS} path segments, found {}",
                segments.len()
            ),
        });
    }

    let time_prefix: String = segments[TIME_SEGMENT]
        .chars()
        .take(TIME_PREFIX_LEN)
        .collect();
    let token = format!("{}_{}", segments[DISK_SEGMENT], time_prefix).replace('.', "-");

    let extension = match output_extension {
        Some(ext) if !ext.is_empty() => ext.to_string(),
        _ => remote_extension(remote_name),
    };

    Ok(download_dir.join(format!("{token}{extension}")))
}

/// Extension of the remote file including the leading dot, or empty
fn remote_extension(remote_name: &str) -> String {
    Path::new(remote_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}
