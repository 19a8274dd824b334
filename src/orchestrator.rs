//! Download cycle and scheduling loop
//!
//! One cycle logs in (capped), logs the device status, lists every selected
//! media kind, then walks the files in listing order: skip what is already on
//! disk or suppressed, download the rest, convert videos, and finally log out.
//! Cycles repeat with a cooldown until shutdown is requested or single-cycle
//! mode is set.
//!
//! Error scopes:
//! - A listing failure (or an exhausted capped retry) ends the cycle early.
//! - A fatal download error skips that file; the cycle continues.
//! - Conversion failures are logged and never stop the cycle.
//! - Exhausting the login attempts in the first cycle is returned to the
//!   caller, which exits. Later cycles log it and wait for the next cycle.

use crate::catalog::FileCatalog;
use crate::config::Config;
use crate::convert::MediaConverter;
use crate::device::DeviceConnector;
use crate::downloader::ResilientDownloader;
use crate::error::{DownloadError, Error, Result};
use crate::naming::derive_target_path;
use crate::retry::RetryPolicy;
use crate::session::DownloadSession;
use crate::skip_list::SkipList;
use crate::types::{MediaKind, RemoteFile};
use chrono::Local;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Counters describing one download cycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Files returned by the catalog across all media kinds
    pub listed: usize,
    /// Files downloaded successfully
    pub downloaded: usize,
    /// Videos converted successfully
    pub converted: usize,
    /// Videos whose conversion failed (source deleted regardless)
    pub conversion_failed: usize,
    /// Files skipped because they exist on disk or are suppressed
    pub skipped: usize,
    /// Files abandoned after a fatal error
    pub failed: usize,
    /// Whether every listed file was processed
    pub completed: bool,
}

/// Runs download cycles against one camera
pub struct Orchestrator {
    config: Config,
    connector: Arc<dyn DeviceConnector>,
    converter: Arc<dyn MediaConverter>,
    catalog: FileCatalog,
    downloader: ResilientDownloader,
    login_policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator
    ///
    /// `shutdown` interrupts backoff and cooldown waits; a download that is
    /// streaming when it fires is allowed to finish.
    pub fn new(
        config: Config,
        connector: Arc<dyn DeviceConnector>,
        converter: Arc<dyn MediaConverter>,
        shutdown: CancellationToken,
    ) -> Self {
        let downloader =
            ResilientDownloader::new(connector.clone(), RetryPolicy::for_downloads(&config.retry))
                .with_shutdown(shutdown.clone());
        let login_policy = RetryPolicy::for_login(&config.retry);

        Self {
            config,
            connector,
            converter,
            catalog: FileCatalog::new(),
            downloader,
            login_policy,
            shutdown,
        }
    }

    /// Use a different file catalog
    pub fn with_catalog(mut self, catalog: FileCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Run cycles until shutdown, or once in single-cycle mode
    ///
    /// # Errors
    ///
    /// Returns [`Error::LoginRetriesExhausted`] when the first cycle could not
    /// log in. Later cycles that cannot log in are skipped until the next one.
    pub async fn run(&self) -> Result<()> {
        info!(
            camera = %self.connector.describe(),
            run_once = self.config.schedule.run_once,
            "starting download loop"
        );

        let mut first_cycle = true;
        loop {
            match self.run_cycle().await {
                Ok(_) => {}
                Err(Error::ShuttingDown) => break,
                Err(e @ Error::LoginRetriesExhausted { .. }) if !first_cycle => {
                    warn!(error = %e, "camera unreachable, trying again next cycle");
                }
                Err(e) => return Err(e),
            }
            first_cycle = false;

            if self.config.schedule.run_once || self.shutdown.is_cancelled() {
                break;
            }

            let cooldown = self.config.schedule.cooldown;
            info!(cooldown_secs = cooldown.as_secs(), "waiting for next cycle");
            tokio::select! {
                _ = tokio::time::sleep(cooldown) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!("download loop stopped");
        Ok(())
    }

    /// Run a single download cycle
    ///
    /// Errors after login are logged and end the cycle early; the returned
    /// report then has `completed == false`.
    ///
    /// # Errors
    ///
    /// - [`Error::LoginRetriesExhausted`] if the camera never accepted a login.
    /// - [`Error::ShuttingDown`] if shutdown was requested while logging in.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut session = self.login().await?;

        let status = session.status().await;
        info!(
            serial = ?status.serial,
            firmware = ?status.firmware,
            battery_percent = ?status.battery_percent,
            storage_total_mb = ?status.storage_total_mb,
            storage_free_mb = ?status.storage_free_mb,
            "device status"
        );

        let mut report = CycleReport::default();
        let result = self.download_all(&mut session, &mut report).await;

        session.logout().await;
        session.close().await;

        match result {
            Ok(()) => report.completed = true,
            Err(Error::ShuttingDown) => warn!("shutdown requested, cycle interrupted"),
            Err(e) => error!(error = %e, "cycle ended early"),
        }
        info!(
            listed = report.listed,
            downloaded = report.downloaded,
            converted = report.converted,
            conversion_failed = report.conversion_failed,
            skipped = report.skipped,
            failed = report.failed,
            completed = report.completed,
            "cycle finished"
        );
        Ok(report)
    }

    /// Move the camera one step in the configured direction
    ///
    /// # Errors
    ///
    /// Returns an error if no direction is configured, login is exhausted or
    /// the PTZ command could not be sent.
    pub async fn move_camera(&self) -> Result<()> {
        let direction = self.config.movement.direction.ok_or_else(|| {
            Error::config("DIRECTION", "direction is required for the move action")
        })?;

        let mut session = self.login().await?;
        let result = session.ptz_step(direction, self.config.movement.step).await;
        session.logout().await;
        session.close().await;
        result
    }

    /// Log in, retrying with backoff up to the configured number of attempts
    async fn login(&self) -> Result<DownloadSession> {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            info!(attempt = attempts, camera = %self.connector.describe(), "logging in");

            let mut session = DownloadSession::connect(self.connector.as_ref());
            match session.login().await {
                Ok(true) => {
                    info!(attempt = attempts, "connected to camera");
                    return Ok(session);
                }
                Ok(false) => warn!(attempt = attempts, "camera offline"),
                Err(e) => warn!(attempt = attempts, error = %e, "login failed"),
            }
            session.close().await;

            if !self.login_policy.allows(attempts) {
                error!(attempts, "could not log in, giving up");
                return Err(Error::LoginRetriesExhausted { attempts });
            }
            self.login_policy.wait(&self.shutdown).await?;
        }
    }

    async fn download_all(
        &self,
        session: &mut DownloadSession,
        report: &mut CycleReport,
    ) -> Result<()> {
        let skip_list = SkipList::load_or_create(&self.config.download.skip_list_path()).await?;

        let start = self.config.download.start_time.ok_or_else(|| {
            Error::config("DOWNLOAD_START_TIME", "download start time is required")
        })?;
        let end = self
            .config
            .download
            .end_time
            .unwrap_or_else(|| Local::now().naive_local());

        let mut queue = Vec::new();
        for &kind in &self.config.download.kinds {
            let files = self
                .catalog
                .list(session.client_mut(), kind, start, end)
                .await?;
            queue.extend(files);
        }
        report.listed = queue.len();

        let mut handled = HashSet::new();
        for file in &queue {
            if self.shutdown.is_cancelled() {
                return Err(Error::ShuttingDown);
            }
            self.process_file(session, file, &skip_list, &mut handled, report)
                .await?;
        }
        Ok(())
    }

    /// Download and convert one file
    ///
    /// Returns `Err` only for failures that end the cycle.
    async fn process_file(
        &self,
        session: &mut DownloadSession,
        file: &RemoteFile,
        skip_list: &SkipList,
        handled: &mut HashSet<PathBuf>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let dir = self.config.download.dir_for(file.kind);
        let raw = match derive_target_path(&file.name, dir, None) {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "skipping file with unexpected name");
                report.failed += 1;
                return Ok(());
            }
        };
        let converted = match file.kind {
            MediaKind::Video => {
                let path =
                    derive_target_path(&file.name, dir, Some(&self.config.download.target_format))?;
                (path != raw).then_some(path)
            }
            MediaKind::Picture => None,
        };

        if let Some(reason) = skip_reason(&raw, converted.as_deref(), skip_list, handled).await? {
            info!(path = ?raw, reason, "skipping file");
            report.skipped += 1;
            return Ok(());
        }
        handled.insert(raw.clone());

        match self.downloader.download(session, file, &raw).await {
            Ok(_) => report.downloaded += 1,
            Err(
                e @ (Error::ShuttingDown
                | Error::LoginRetriesExhausted { .. }
                | Error::Download(DownloadError::RetriesExhausted { .. })),
            ) => return Err(e),
            Err(e) => {
                warn!(remote = %file.name, error = %e, "skipping file after fatal error");
                report.failed += 1;
                return Ok(());
            }
        }

        if let Some(converted) = converted {
            if self.converter.convert(&raw, &converted).await.success {
                report.converted += 1;
            } else {
                report.conversion_failed += 1;
            }
        }
        Ok(())
    }
}

/// Why a file must not be downloaded, if it must not
///
/// Filesystem errors other than "not found" are returned: a target that
/// cannot be inspected must not be overwritten.
async fn skip_reason(
    raw: &Path,
    converted: Option<&Path>,
    skip_list: &SkipList,
    handled: &HashSet<PathBuf>,
) -> Result<Option<&'static str>> {
    if handled.contains(raw) {
        return Ok(Some("already handled this cycle"));
    }
    if tokio::fs::try_exists(raw).await? {
        return Ok(Some("file already exists"));
    }
    if let Some(converted) = converted
        && tokio::fs::try_exists(converted).await?
    {
        return Ok(Some("converted file already exists"));
    }
    if skip_list.contains(raw) || converted.is_some_and(|path| skip_list.contains(path)) {
        return Ok(Some("listed in skip list"));
    }
    Ok(None)
}
