//! Paginated listing of recordings stored on the device

use crate::device::DeviceClient;
use crate::device::codec::msg;
use crate::device::commands::{self, is_success, ret_code};
use crate::error::{DeviceError, Error, Result};
use crate::types::{MediaKind, RemoteFile};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Maximum number of entries the device returns per file query
pub const PAGE_CAP: usize = 64;

/// Lists every file of a kind in a time range
///
/// The device answers at most [`PAGE_CAP`] entries per query and signals a
/// truncated page by returning exactly that many. Follow-up queries start at
/// the `begin_time` of the last entry, so the boundary entry is returned
/// again; entries already seen by name are dropped, keeping the first
/// occurrence and the device's order.
#[derive(Clone, Copy, Debug)]
pub struct FileCatalog {
    page_cap: usize,
}

impl Default for FileCatalog {
    fn default() -> Self {
        Self { page_cap: PAGE_CAP }
    }
}

impl FileCatalog {
    /// Catalog using the device's page cap
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with a custom page cap
    pub fn with_page_cap(page_cap: usize) -> Self {
        Self {
            page_cap: page_cap.max(1),
        }
    }

    /// List all files of `kind` between `start` and `end`
    ///
    /// An empty or `null` first page is a valid "no files" answer.
    ///
    /// # Errors
    ///
    /// - [`Error::FileListing`] if the device replies with a non-success
    ///   status or not at all; no further queries are made.
    /// - [`Error::Device`] on transport failures or unparseable entries.
    pub async fn list(
        &self,
        client: &mut dyn DeviceClient,
        kind: MediaKind,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RemoteFile>> {
        let mut files = Vec::new();
        let mut seen = HashSet::new();
        let mut page_start = start;
        let mut pages = 0u32;

        loop {
            let reply = client
                .send(msg::FILE_QUERY, commands::file_query(kind, &page_start, &end))
                .await?;
            let reply = match reply {
                Some(reply) if is_success(&reply) => reply,
                other => {
                    let status = other.as_ref().and_then(ret_code);
                    warn!(%kind, ?status, "could not get files");
                    return Err(Error::FileListing { status });
                }
            };

            let page = commands::parse_file_page(&reply, kind)
                .map_err(|e| DeviceError::Protocol(format!("invalid file list entry: {e}")))?;
            pages += 1;

            let truncated = page.len() >= self.page_cap;
            let next_start = page.last().map(|file| file.begin_time);
            let page_len = page.len();

            let mut added = 0usize;
            for file in page {
                if seen.insert(file.name.clone()) {
                    files.push(file);
                    added += 1;
                } else {
                    debug!(name = %file.name, "dropping duplicate listing entry");
                }
            }
            debug!(%kind, page = pages, entries = page_len, added, "file page received");

            if !truncated {
                break;
            }
            if added == 0 {
                warn!(%kind, %page_start, "file listing made no progress, stopping pagination");
                break;
            }
            match next_start {
                Some(next) => page_start = next,
                None => break,
            }
        }

        if files.is_empty() {
            info!(%kind, %start, %end, "no files found for this range");
        } else {
            info!(%kind, count = files.len(), pages, "found files");
        }
        Ok(files)
    }
}
