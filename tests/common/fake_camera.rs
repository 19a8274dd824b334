//! In-memory camera and transcoder doubles
//!
//! Every client created by a [`FakeCamera`] shares one [`CameraState`], so a
//! test can script disconnects and failed logins up front and inspect what
//! the downloader did afterwards.

use async_trait::async_trait;
use dvrip_dl::device::codec::msg;
use dvrip_dl::device::{DeviceClient, DeviceConnector, DeviceResult, DownloadSink};
use dvrip_dl::types::DEVICE_TIME_FORMAT;
use dvrip_dl::{ConversionResult, DeviceError, MediaConverter};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Scripted behavior and recorded traffic
#[derive(Debug, Default)]
pub struct CameraState {
    /// Remote names returned for video queries
    pub videos: Vec<String>,
    /// Remote names returned for picture queries
    pub pictures: Vec<String>,
    /// When set, every file query is answered with this `Ret`
    pub listing_status: Option<i64>,
    /// Number of upcoming logins that report the camera as unreachable
    pub unreachable_logins: u32,
    /// Per-login answers consumed before `unreachable_logins` applies
    pub login_script: VecDeque<bool>,
    /// Cancel the token once this many file queries were received
    pub cancel_after_queries: Option<(u32, CancellationToken)>,
    /// Local path whose presence is recorded at every login
    pub watched_target: Option<PathBuf>,
    /// Remaining mid-stream disconnects per remote name
    pub disconnects: HashMap<String, u32>,
    /// Remote names whose playback claim is rejected
    pub rejected: Vec<String>,
    /// Remote names whose stream completes without data
    pub empty: Vec<String>,

    /// Clients handed out by the connector
    pub clients_created: u32,
    /// Login calls
    pub logins: u32,
    /// Logout calls
    pub logouts: u32,
    /// Close calls
    pub closes: u32,
    /// File queries received
    pub file_queries: u32,
    /// Remote names for which a stream was started
    pub streams_started: Vec<String>,
    /// Remote names streamed to completion
    pub streams_completed: Vec<String>,
    /// PTZ requests received
    pub ptz_commands: Vec<Value>,
    /// `OPPlayBack` actions sent as control messages, in order
    pub playback_actions: Vec<String>,
    /// Whether `watched_target` existed, one entry per login
    pub target_present_at_login: Vec<bool>,
}

/// Connector producing clients bound to one shared [`CameraState`]
#[derive(Clone, Default)]
pub struct FakeCamera {
    state: Arc<Mutex<CameraState>>,
}

impl FakeCamera {
    /// Camera listing the given videos and no pictures
    pub fn with_videos(videos: &[&str]) -> Self {
        let camera = Self::default();
        camera.state().videos = videos.iter().map(|v| v.to_string()).collect();
        camera
    }

    /// Lock the shared state
    pub fn state(&self) -> MutexGuard<'_, CameraState> {
        self.state.lock().unwrap()
    }
}

impl DeviceConnector for FakeCamera {
    fn new_client(&self) -> Box<dyn DeviceClient> {
        self.state().clients_created += 1;
        Box::new(FakeClient {
            state: self.state.clone(),
        })
    }

    fn describe(&self) -> String {
        "fake-camera".to_string()
    }
}

/// Payload the fake camera serves for `name`
pub fn payload_for(name: &str) -> Vec<u8> {
    format!("recording:{name}").into_bytes()
}

struct FakeClient {
    state: Arc<Mutex<CameraState>>,
}

impl FakeClient {
    fn state(&self) -> MutexGuard<'_, CameraState> {
        self.state.lock().unwrap()
    }
}

fn file_name(payload: &Value) -> String {
    payload["OPPlayBack"]["Parameter"]["FileName"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

fn playback_action(payload: &Value) -> String {
    payload["OPPlayBack"]["Action"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

fn entries(names: &[String]) -> Vec<Value> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "FileName": name,
                "BeginTime": format!("2023-04-01 08:{:02}:00", i % 60),
                "EndTime": format!("2023-04-01 08:{:02}:50", i % 60),
            })
        })
        .collect()
}

#[async_trait]
impl DeviceClient for FakeClient {
    async fn login(&mut self) -> DeviceResult<bool> {
        let mut state = self.state();
        state.logins += 1;
        if let Some(target) = state.watched_target.clone() {
            state.target_present_at_login.push(target.exists());
        }
        if let Some(answer) = state.login_script.pop_front() {
            return Ok(answer);
        }
        if state.unreachable_logins > 0 {
            state.unreachable_logins -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    async fn logout(&mut self) -> DeviceResult<()> {
        self.state().logouts += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.state().closes += 1;
    }

    async fn send(&mut self, code: u16, payload: Value) -> DeviceResult<Option<Value>> {
        let mut state = self.state();
        let reply = match code {
            msg::FILE_QUERY => {
                state.file_queries += 1;
                if let Some((after, token)) = &state.cancel_after_queries
                    && state.file_queries >= *after
                {
                    token.cancel();
                }
                if let Some(ret) = state.listing_status {
                    json!({"Name": "OPFileQuery", "Ret": ret})
                } else {
                    let names = match payload["OPFileQuery"]["Type"].as_str() {
                        Some("jpg") => &state.pictures,
                        _ => &state.videos,
                    };
                    json!({"Name": "OPFileQuery", "Ret": 100, "OPFileQuery": entries(names)})
                }
            }
            msg::PLAYBACK_CLAIM => {
                state.playback_actions.push(playback_action(&payload));
                let ret = if state.rejected.contains(&file_name(&payload)) {
                    106
                } else {
                    100
                };
                json!({"Name": "OPPlayBack", "Ret": ret})
            }
            msg::PLAYBACK => {
                state.playback_actions.push(playback_action(&payload));
                json!({"Name": "OPPlayBack", "Ret": 100})
            }
            msg::SYSTEM_INFO => json!({
                "Name": payload["Name"].clone(),
                "Ret": 100,
                "SystemInfo": {"SerialNo": "fake0001", "SoftWareVersion": "V0.0.1"},
            }),
            msg::PTZ_CONTROL => {
                state.ptz_commands.push(payload);
                json!({"Name": "OPPTZControl", "Ret": 100})
            }
            other => {
                return Err(DeviceError::Protocol(format!("unexpected message {other}")));
            }
        };
        Ok(Some(reply))
    }

    async fn send_download(
        &mut self,
        _channel: u8,
        _code: u16,
        payload: Value,
        sink: &mut DownloadSink<'_>,
    ) -> DeviceResult<Option<u64>> {
        let name = file_name(&payload);
        let (disconnect, empty) = {
            let mut state = self.state();
            state.streams_started.push(name.clone());
            let disconnect = match state.disconnects.get_mut(&name) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            (disconnect, state.empty.contains(&name))
        };

        if empty {
            return Ok(Some(0));
        }

        let data = payload_for(&name);
        if disconnect {
            sink.write_all(&data[..data.len() / 2]).await?;
            sink.flush().await?;
            return Ok(None);
        }

        sink.write_all(&data).await?;
        self.state().streams_completed.push(name);
        Ok(Some(data.len() as u64))
    }
}

/// Transcoder double that copies the source and always deletes it
#[derive(Clone, Default)]
pub struct FakeConverter {
    /// Conversions requested, in order
    pub calls: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    /// Report failure instead of producing the target
    pub fail: bool,
}

impl FakeConverter {
    /// Converter whose every conversion fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Recorded `(source, target)` pairs
    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaConverter for FakeConverter {
    async fn convert(&self, source: &Path, target: &Path) -> ConversionResult {
        self.calls
            .lock()
            .unwrap()
            .push((source.to_path_buf(), target.to_path_buf()));

        let success = !self.fail && std::fs::copy(source, target).is_ok();
        let source_deleted = std::fs::remove_file(source).is_ok();
        ConversionResult {
            success,
            source_deleted,
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Parse a device timestamp
pub fn device_time(s: &str) -> chrono::NaiveDateTime {
    chrono::NaiveDateTime::parse_from_str(s, DEVICE_TIME_FORMAT).unwrap()
}
