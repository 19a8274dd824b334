//! JSON payloads for the device commands the downloader issues

use crate::types::{
    DeviceStatus, Direction, MediaKind, RemoteFile, device_time, format_device_time,
};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{Value, json};

/// `Ret` code of a successful reply
pub const RET_OK: i64 = 100;

/// `Ret` code of a successful login that asks for a password change
pub const RET_OK_CHANGE_PASSWORD: i64 = 515;

/// Read the `Ret` status code of a reply
pub fn ret_code(reply: &Value) -> Option<i64> {
    reply.get("Ret").and_then(Value::as_i64)
}

/// Whether a reply carries a success status
pub fn is_success(reply: &Value) -> bool {
    ret_code(reply) == Some(RET_OK)
}

/// `OPFileQuery` request for one page of recordings
pub fn file_query(kind: MediaKind, start: &NaiveDateTime, end: &NaiveDateTime) -> Value {
    json!({
        "Name": "OPFileQuery",
        "OPFileQuery": {
            "BeginTime": format_device_time(start),
            "Channel": 0,
            "DriverTypeMask": "0x0000FFFF",
            "EndTime": format_device_time(end),
            "Event": "*",
            "StreamType": "0x00000000",
            "Type": kind.query_type(),
        },
    })
}

/// One entry of an `OPFileQuery` reply
#[derive(Debug, Deserialize)]
struct FileEntry {
    #[serde(rename = "FileName")]
    file_name: String,
    #[serde(rename = "BeginTime", deserialize_with = "device_time::deserialize")]
    begin_time: NaiveDateTime,
    #[serde(rename = "EndTime", deserialize_with = "device_time::deserialize")]
    end_time: NaiveDateTime,
}

/// Extract the listed files from an `OPFileQuery` reply
///
/// A missing or `null` list means "no files in range" and yields an empty page.
pub fn parse_file_page(reply: &Value, kind: MediaKind) -> Result<Vec<RemoteFile>, String> {
    let entries = match reply.get("OPFileQuery") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(list) => Vec::<FileEntry>::deserialize(list).map_err(|e| e.to_string())?,
    };

    Ok(entries
        .into_iter()
        .map(|entry| RemoteFile {
            name: entry.file_name,
            kind,
            begin_time: entry.begin_time,
            end_time: entry.end_time,
        })
        .collect())
}

/// `OPPlayBack` request naming a file
///
/// `action` is one of `Claim`, `DownloadStart`, `DownloadStop`.
pub fn playback(action: &str, file: &RemoteFile) -> Value {
    let mut parameter = json!({
        "PlayMode": "ByName",
        "FileName": file.name,
        "StreamType": 0,
        "Value": 0,
        "TransMode": "TCP",
    });
    if action.ends_with("Stop") {
        parameter["Channel"] = json!(0);
    }

    json!({
        "Name": "OPPlayBack",
        "OPPlayBack": {
            "Action": action,
            "Parameter": parameter,
            "StartTime": format_device_time(&file.begin_time),
            "EndTime": format_device_time(&file.end_time),
        },
    })
}

/// `OPPTZControl` request
///
/// A step is a start command (`Preset` 65535) followed by a stop command
/// (`Preset` -1); the motor keeps running until the stop arrives.
pub fn ptz(direction: Direction, step: u32, stop: bool) -> Value {
    json!({
        "Name": "OPPTZControl",
        "OPPTZControl": {
            "Command": direction.command(),
            "Parameter": {
                "AUX": {"Number": 0, "Status": "On"},
                "Channel": 0,
                "MenuOpts": "Enter",
                "POINT": {"bottom": 0, "left": 0, "right": 0, "top": 0},
                "Pattern": "SetBegin",
                "Preset": if stop { -1 } else { 65535 },
                "Step": step,
                "Tour": 0,
            },
        },
    })
}

/// Information query (`SystemInfo`, `StorageInfo`)
pub fn info_query(name: &str) -> Value {
    json!({ "Name": name })
}

/// Fold `SystemInfo` and `StorageInfo` replies into a [`DeviceStatus`]
///
/// Either reply may be absent; missing fields stay `None`.
pub fn parse_status(system: Option<&Value>, storage: Option<&Value>) -> DeviceStatus {
    let mut status = DeviceStatus::default();

    if let Some(info) = system.and_then(|s| s.get("SystemInfo")) {
        status.serial = info
            .get("SerialNo")
            .and_then(Value::as_str)
            .map(str::to_string);
        status.firmware = info
            .get("SoftWareVersion")
            .and_then(Value::as_str)
            .map(str::to_string);
        status.battery_percent = info
            .get("BatteryPercent")
            .and_then(Value::as_u64)
            .and_then(|p| u8::try_from(p.min(100)).ok());
    }

    if let Some(disks) = storage
        .and_then(|s| s.get("StorageInfo"))
        .and_then(Value::as_array)
    {
        let partitions = disks
            .iter()
            .filter_map(|disk| disk.get("Partition").and_then(Value::as_array))
            .flatten();
        let mut total = 0u64;
        let mut free = 0u64;
        let mut seen = false;
        for partition in partitions {
            if let (Some(t), Some(r)) = (
                partition.get("TotalSpace").and_then(parse_hex_field),
                partition.get("RemainSpace").and_then(parse_hex_field),
            ) {
                total += t;
                free += r;
                seen = true;
            }
        }
        if seen {
            status.storage_total_mb = Some(total);
            status.storage_free_mb = Some(free);
        }
    }

    status
}

/// Storage sizes are reported as hex strings (`"0x00003B9C"`) in megabytes
fn parse_hex_field(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => {
            let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
            u64::from_str_radix(hex, 16).ok()
        }
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
