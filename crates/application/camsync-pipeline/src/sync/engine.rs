use camino::Utf8Path;
use camsync_core::plan::{plan, unique_remote_names};
use camsync_core::SyncSummary;
use camsync_infra::{DeviceSession, DownloadEvent, Downloader};
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};

use crate::sync::local::{ensure_dir, scan_local_files};
use crate::sync::{DeletePolicy, SyncError, SyncOptions, SyncReport};

/// One camera-to-directory run.
///
/// The device session is opened at the start of [`SyncEngine::run`] and closed
/// on every way out of it.
pub struct SyncEngine {
    session: DeviceSession,
    downloader: Downloader,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(session: DeviceSession, downloader: Downloader, options: SyncOptions) -> Self {
        Self {
            session,
            downloader,
            options,
        }
    }

    pub async fn run(
        &self,
        dest_dir: &Utf8Path,
        progress_tx: Option<Sender<DownloadEvent>>,
    ) -> Result<SyncReport, SyncError> {
        let res = self.run_stages(dest_dir, progress_tx).await;
        self.session.close().await;

        match &res {
            Ok(report) => info!(
                planned = report.planned,
                succeeded = report.summary.succeeded,
                failed = report.summary.failed.len(),
                "sync finished"
            ),
            Err(e) => warn!("sync aborted: {e}"),
        }
        res
    }

    /// Connect and list only; nothing is downloaded. Always closes.
    pub async fn preview(&self, dest_dir: &Utf8Path) -> Result<SyncReport, SyncError> {
        let res = async {
            self.session.open(&self.options.retry).await?;
            let listing = self.session.list_files(self.options.list_timeout).await?;
            let local = if dest_dir.is_dir() {
                scan_local_files(dest_dir)?
            } else {
                Default::default()
            };
            let plan = plan(&listing.uris, &local);
            Ok::<_, SyncError>((listing, plan))
        }
        .await;
        self.session.close().await;

        let (listing, plan) = res?;
        Ok(SyncReport {
            listing_total: listing.total_count,
            remote_unique: unique_remote_names(&listing.uris),
            planned: plan.len(),
            summary: SyncSummary::default(),
        })
    }

    async fn run_stages(
        &self,
        dest_dir: &Utf8Path,
        progress_tx: Option<Sender<DownloadEvent>>,
    ) -> Result<SyncReport, SyncError> {
        // Step 1: Connect and fetch the remote listing.
        self.session.open(&self.options.retry).await?;
        let listing = self.session.list_files(self.options.list_timeout).await?;

        // Step 2: What is already on disk.
        ensure_dir(dest_dir)?;
        let local = scan_local_files(dest_dir)?;

        // Step 3: Diff.
        let plan = plan(&listing.uris, &local);
        let remote_unique = unique_remote_names(&listing.uris);
        info!(
            listed = listing.uris.len(),
            unique = remote_unique,
            local = local.len(),
            to_download = plan.len(),
            "sync plan ready"
        );

        let mut report = SyncReport {
            listing_total: listing.total_count,
            remote_unique,
            planned: plan.len(),
            summary: SyncSummary::default(),
        };

        if plan.is_empty() {
            info!("up to date, nothing to download");
            return Ok(report);
        }

        // Step 4: Transfer.
        let mut summary = self
            .downloader
            .download_all(&plan, dest_dir, progress_tx)
            .await;

        // Step 5: Optional remote cleanup.
        if self.options.delete_policy == DeletePolicy::AfterVerified {
            self.delete_verified(&mut summary).await;
        }

        report.summary = summary;
        Ok(report)
    }

    /// Deletes only what passed verification; everything else is skipped and
    /// counted. A failed delete is logged and does not fail the run.
    async fn delete_verified(&self, summary: &mut SyncSummary) {
        let mut verified = Vec::new();
        let mut skipped = 0;
        for res in summary.results.iter().filter(|r| r.succeeded()) {
            if res.is_verified() {
                verified.push(res.uri.clone());
            } else {
                warn!(file = %res.name, "deletion skipped: local copy not verified");
                skipped += 1;
            }
        }
        summary.deletions_skipped += skipped;

        if verified.is_empty() {
            return;
        }

        let count = verified.len();
        if let Err(e) = self
            .session
            .delete_files(verified, self.options.delete_timeout)
            .await
        {
            warn!(count, "remote delete failed: {e}");
        }
    }
}
