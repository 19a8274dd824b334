//! Reconnect and re-login behavior of the resilient downloader

mod common;

use common::{FakeCamera, VIDEO_A, payload_for, remote_video};
use dvrip_dl::error::{DownloadError, Error};
use dvrip_dl::{DownloadSession, ResilientDownloader, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

async fn logged_in_session(camera: &FakeCamera) -> DownloadSession {
    let mut session = DownloadSession::connect(camera);
    assert!(session.login().await.unwrap());
    session
}

#[tokio::test]
async fn reconnects_after_each_disconnect_until_complete() {
    let camera = FakeCamera::with_videos(&[VIDEO_A]);
    camera.state().disconnects.insert(VIDEO_A.to_string(), 2);
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("2023-04-01_08-15-00.h264");
    camera.state().watched_target = Some(target.clone());

    let mut session = logged_in_session(&camera).await;
    let downloader = ResilientDownloader::new(
        Arc::new(camera.clone()),
        RetryPolicy::unbounded(Duration::ZERO),
    );

    let bytes = downloader
        .download(&mut session, &remote_video(VIDEO_A), &target)
        .await
        .unwrap();

    let expected = payload_for(VIDEO_A);
    assert_eq!(bytes, expected.len() as u64);
    assert_eq!(std::fs::read(&target).unwrap(), expected);

    let state = camera.state();
    assert_eq!(state.clients_created, 3, "initial client plus two reconnects");
    assert_eq!(state.logins, 3, "initial login plus two re-logins");
    assert_eq!(state.streams_started.len(), 3);
    assert_eq!(state.streams_completed, vec![VIDEO_A.to_string()]);
    assert_eq!(
        state.target_present_at_login,
        vec![false, false, false],
        "partial file is removed before every re-login"
    );
}

#[tokio::test]
async fn failed_relogin_is_retried() {
    let camera = FakeCamera::with_videos(&[VIDEO_A]);
    camera.state().disconnects.insert(VIDEO_A.to_string(), 1);
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("clip.h264");

    let mut session = logged_in_session(&camera).await;
    camera.state().unreachable_logins = 2;
    let downloader = ResilientDownloader::new(
        Arc::new(camera.clone()),
        RetryPolicy::unbounded(Duration::ZERO),
    );

    downloader
        .download(&mut session, &remote_video(VIDEO_A), &target)
        .await
        .unwrap();

    let state = camera.state();
    assert_eq!(state.logins, 4, "initial login, two refused, one accepted");
    assert_eq!(state.clients_created, 4, "each re-login uses a fresh client");
    assert_eq!(std::fs::read(&target).unwrap(), payload_for(VIDEO_A));
}

#[tokio::test]
async fn capped_policy_gives_up_and_leaves_no_partial_file() {
    let camera = FakeCamera::with_videos(&[VIDEO_A]);
    camera.state().disconnects.insert(VIDEO_A.to_string(), 10);
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("clip.h264");

    let mut session = logged_in_session(&camera).await;
    let downloader = ResilientDownloader::new(
        Arc::new(camera.clone()),
        RetryPolicy::bounded(Duration::ZERO, 3),
    );

    let err = downloader
        .download(&mut session, &remote_video(VIDEO_A), &target)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Download(DownloadError::RetriesExhausted { attempts: 3, .. })
    ));
    assert!(!target.exists(), "partial download must be removed");
    assert_eq!(camera.state().streams_started.len(), 3);
}

#[tokio::test]
async fn rejected_playback_is_fatal_without_retry() {
    let camera = FakeCamera::with_videos(&[VIDEO_A]);
    camera.state().rejected.push(VIDEO_A.to_string());
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("clip.h264");

    let mut session = logged_in_session(&camera).await;
    let downloader = ResilientDownloader::new(
        Arc::new(camera.clone()),
        RetryPolicy::unbounded(Duration::ZERO),
    );

    let err = downloader
        .download(&mut session, &remote_video(VIDEO_A), &target)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Download(DownloadError::PlaybackRejected { status: Some(106), .. })
    ));
    let state = camera.state();
    assert_eq!(state.clients_created, 1, "no reconnect on fatal errors");
    assert!(state.streams_started.is_empty());
    assert!(!target.exists());
}

#[tokio::test]
async fn empty_stream_is_fatal_and_removes_target() {
    let camera = FakeCamera::with_videos(&[VIDEO_A]);
    camera.state().empty.push(VIDEO_A.to_string());
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("clip.h264");

    let mut session = logged_in_session(&camera).await;
    let downloader = ResilientDownloader::new(
        Arc::new(camera.clone()),
        RetryPolicy::unbounded(Duration::ZERO),
    );

    let err = downloader
        .download(&mut session, &remote_video(VIDEO_A), &target)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Download(DownloadError::EmptyPayload { .. })
    ));
    let state = camera.state();
    assert_eq!(state.streams_started.len(), 1);
    assert_eq!(
        state.playback_actions,
        vec!["Claim".to_string(), "DownloadStop".to_string()],
        "playback context is released after a fatal attempt"
    );
    assert!(!target.exists());
}

#[tokio::test]
async fn completed_download_releases_playback_context() {
    let camera = FakeCamera::with_videos(&[VIDEO_A]);
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("clip.h264");

    let mut session = logged_in_session(&camera).await;
    let downloader = ResilientDownloader::new(
        Arc::new(camera.clone()),
        RetryPolicy::unbounded(Duration::ZERO),
    );

    downloader
        .download(&mut session, &remote_video(VIDEO_A), &target)
        .await
        .unwrap();

    assert_eq!(
        camera.state().playback_actions,
        vec!["Claim".to_string(), "DownloadStop".to_string()]
    );
}
