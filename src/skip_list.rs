//! Persisted set of target paths that are never downloaded again
//!
//! The skip list is a JSON array of path strings. It is created empty when
//! missing, loaded once per cycle and consulted read-only while the cycle
//! runs. Entries are never pruned automatically.

use crate::error::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Operator-maintained set of target paths to skip
#[derive(Clone, Debug, Default)]
pub struct SkipList {
    path: Option<PathBuf>,
    entries: BTreeSet<String>,
}

impl SkipList {
    /// Load the skip list at `path`, creating an empty one if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or created, or if it is
    /// not a JSON array of strings.
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        let missing = match fs::metadata(path).await {
            Ok(_) => false,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        if missing {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).await?;
            }
            fs::write(path, b"[]").await?;
            info!(?path, "created empty skip list");
            return Ok(Self {
                path: Some(path.to_path_buf()),
                entries: BTreeSet::new(),
            });
        }

        let raw = fs::read(path).await?;
        let entries: Vec<String> = serde_json::from_slice(&raw)?;
        debug!(?path, entries = entries.len(), "loaded skip list");

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: entries.into_iter().collect(),
        })
    }

    /// Build an in-memory skip list that is not backed by a file
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: None,
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `target` is suppressed
    ///
    /// Matching is exact on the path's string form, the same form the
    /// downloader derives for the target.
    #[must_use]
    pub fn contains(&self, target: &Path) -> bool {
        self.entries.contains(target.to_string_lossy().as_ref())
    }

    /// Add a target; returns false if it was already present
    pub fn insert(&mut self, target: &Path) -> bool {
        self.entries.insert(target.to_string_lossy().into_owned())
    }

    /// Write the list back to its file (no-op for in-memory lists)
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let entries: Vec<&String> = self.entries.iter().collect();
        let json = serde_json::to_vec_pretty(&entries)?;
        fs::write(path, json).await?;
        Ok(())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
