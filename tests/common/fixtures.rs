//! Configuration and remote-name fixtures

use dvrip_dl::config::Config;
use dvrip_dl::types::{Action, MediaKind, RemoteFile};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Remote video recorded at 08:15:00 on 2023-04-01
pub const VIDEO_A: &str = "/mnt/sd/2023-04-01/001/08.15.00-08.20.00[R][@5a2][0].h264";
/// Remote video recorded at 09:30:12 on 2023-04-01
pub const VIDEO_B: &str = "/mnt/sd/2023-04-01/001/09.30.12-09.31.00[R][@5a3][0].h264";
/// Remote video recorded at 10:02:45 on 2023-04-01
pub const VIDEO_C: &str = "/mnt/sd/2023-04-01/001/10.02.45-10.03.30[R][@5a4][0].h264";
/// Remote snapshot taken at 17:03:41 on 2023-04-02
pub const PICTURE_A: &str = "/mnt/sd/2023-04-02/002/17.03.41-17.03.41[M][@1f][0].jpg";

/// Download configuration rooted at `root`, with zero backoff and one cycle
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.action = Action::Download;
    config.camera.host = "192.0.2.10".to_string();
    config.camera.user = "admin".to_string();
    config.download.start_time = Some(super::device_time("2023-04-01 00:00:00"));
    config.download.end_time = Some(super::device_time("2023-04-02 23:59:59"));
    config.download.video_dir = root.join("videos");
    config.download.target_format = ".mp4".to_string();
    config.download.skip_list_file = Some(root.join("skip-list.json"));
    config.download.kinds = vec![MediaKind::Video];
    config.retry.backoff = Duration::ZERO;
    config.retry.login_max_attempts = 3;
    config.schedule.run_once = true;
    config
}

/// Raw download path of `name` under `dir`
pub fn raw_path(dir: &Path, name: &str) -> PathBuf {
    dvrip_dl::naming::derive_target_path(name, dir, None).unwrap()
}

/// Converted path of `name` under `dir`
pub fn mp4_path(dir: &Path, name: &str) -> PathBuf {
    dvrip_dl::naming::derive_target_path(name, dir, Some(".mp4")).unwrap()
}

/// Remote video entry with fixed times
pub fn remote_video(name: &str) -> RemoteFile {
    RemoteFile {
        name: name.to_string(),
        kind: MediaKind::Video,
        begin_time: super::device_time("2023-04-01 08:15:00"),
        end_time: super::device_time("2023-04-01 08:20:00"),
    }
}
