use crate::RunConfig;
use anyhow::{Context, Result};
use camsync_config::BRIDGE_CONNECT_TIMEOUT;
use camsync_infra::device::BridgeTransport;
use camsync_infra::wifi::{find_and_connect, matching_network};
use camsync_infra::{
    default_http_client, platform_associator, DeviceSession, DownloadEvent, Downloader,
    NetworkAssociator,
};
use camsync_pipeline::{ProgressTracker, SyncEngine, SyncReport};
use humansize::{format_size, DECIMAL};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

fn build_engine(cfg: &RunConfig) -> Result<SyncEngine> {
    let transport = Arc::new(BridgeTransport::new(
        cfg.bridge_addr.clone(),
        BRIDGE_CONNECT_TIMEOUT,
    ));
    let client = default_http_client().context("Failed to build HTTP client")?;
    Ok(SyncEngine::new(
        DeviceSession::new(transport),
        Downloader::new(client, cfg.http_base_url.clone()),
        cfg.options.clone(),
    ))
}

/// Joins the camera network unless association is turned off.
///
/// Returns the associator to disconnect with afterwards.
async fn associate(cfg: &RunConfig) -> Result<Option<Box<dyn NetworkAssociator>>> {
    if !cfg.wifi {
        return Ok(None);
    }

    println!(":: Looking for camera Wi-Fi...");
    let prefixes = cfg.ssid_prefixes.clone();
    let (associator, joined) = tokio::task::spawn_blocking(move || -> Result<_> {
        let associator = platform_associator().context("Wi-Fi control unavailable")?;
        let joined = find_and_connect(associator.as_ref(), &prefixes)
            .context("Failed to join camera Wi-Fi")?;
        Ok((associator, joined))
    })
    .await??;

    match joined {
        Some(network) => {
            println!("   Connected to {network}");
            Ok(Some(associator))
        }
        None => anyhow::bail!(
            "No camera network joined (looked for SSIDs starting with {})",
            cfg.ssid_prefixes.join(", ")
        ),
    }
}

async fn disassociate(associator: Option<Box<dyn NetworkAssociator>>) {
    let Some(associator) = associator else {
        return;
    };
    let res = tokio::task::spawn_blocking(move || associator.disconnect()).await;
    match res {
        Ok(Ok(())) => println!(":: Disconnected from camera Wi-Fi"),
        Ok(Err(e)) => warn!("Wi-Fi disconnect failed: {e}"),
        Err(e) => warn!("Wi-Fi disconnect task failed: {e}"),
    }
}

/// Awaits `body`, then leaves the camera network whatever the outcome.
async fn while_associated<T>(
    associator: Option<Box<dyn NetworkAssociator>>,
    body: impl Future<Output = Result<T>>,
) -> Result<T> {
    let res = body.await;
    disassociate(associator).await;
    res
}

/// Full run: associate, sync with progress bars, print the summary.
///
/// Per-file transfer failures are reported but do not make this an error.
pub async fn cmd_sync(cfg: &RunConfig) -> Result<SyncReport> {
    println!(":: Synchronizing camera...");
    println!("   Target: {}", cfg.dest_dir);

    let associator = associate(cfg).await?;
    let report = while_associated(associator, run_with_progress(cfg)).await?;
    print_summary(&report);
    Ok(report)
}

async fn run_with_progress(cfg: &RunConfig) -> Result<SyncReport> {
    let engine = build_engine(cfg)?;
    let dest = cfg.dest_dir.clone();

    let (tx, mut rx) = tokio::sync::mpsc::channel(100);
    let engine_handle = tokio::spawn(async move { engine.run(&dest, Some(tx)).await });

    let m = MultiProgress::new();
    let sty_files =
        ProgressStyle::with_template("{prefix:>10} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("=>-");
    let sty_bytes = ProgressStyle::with_template(
        "{prefix:>10} {bar:30.green/white} {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
    )
    .context("invalid progress template")?
    .progress_chars("=>-");
    let sty_spinner =
        ProgressStyle::with_template("{prefix:>10} {spinner:.green} {bytes} {bytes_per_sec}")
            .context("invalid progress template")?;

    let pb_files = m.add(ProgressBar::new(0));
    pb_files.set_style(sty_files);
    pb_files.set_prefix("Files");
    pb_files.set_message("Listing...");

    let mut tracker = ProgressTracker::new(0);
    let mut pb_file: Option<ProgressBar> = None;

    while let Some(ev) = rx.recv().await {
        match &ev {
            DownloadEvent::Planned { .. } => pb_files.set_message(""),
            DownloadEvent::Started {
                name, total_bytes, ..
            } => {
                let bar = match total_bytes {
                    Some(len) => {
                        let bar = m.add(ProgressBar::new(*len));
                        bar.set_style(sty_bytes.clone());
                        bar
                    }
                    None => {
                        let bar = m.add(ProgressBar::new_spinner());
                        bar.set_style(sty_spinner.clone());
                        bar.enable_steady_tick(Duration::from_millis(100));
                        bar
                    }
                };
                bar.set_prefix(shorten(name, 10));
                if let Some(prev) = pb_file.replace(bar) {
                    prev.finish_and_clear();
                }
            }
            DownloadEvent::Progress { bytes_delta, .. } => {
                if let Some(bar) = &pb_file {
                    bar.inc(*bytes_delta);
                }
            }
            DownloadEvent::Completed { success, .. } => {
                if let Some(bar) = pb_file.take() {
                    bar.finish_and_clear();
                }
                if !success {
                    pb_files.set_message("(with failures)");
                }
            }
        }
        tracker.update(ev);
        let snap = tracker.get_snapshot();
        pb_files.set_length(snap.total_files);
        pb_files.set_position(snap.completed_files + snap.failed_files);
    }

    let report = engine_handle.await.context("sync task panicked")??;
    let snap = tracker.get_snapshot();
    pb_files.finish_with_message(format!(
        "{} transferred",
        format_size(snap.downloaded_bytes, DECIMAL)
    ));
    Ok(report)
}

fn shorten(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else {
        let head: String = name.chars().take(width.saturating_sub(1)).collect();
        format!("{head}~")
    }
}

pub fn print_summary(report: &SyncReport) {
    let s = &report.summary;
    println!(":: Sync summary");
    println!(
        "   Camera:     {} files listed ({} unique)",
        report.listing_total, report.remote_unique
    );
    println!("   Present:    {}", report.already_present());
    if report.planned == 0 {
        println!("   Up to date, nothing to download.");
        return;
    }
    println!("   Attempted:  {}", s.attempted);
    println!(
        "   Downloaded: {} ({})",
        s.succeeded,
        format_size(s.bytes_written, DECIMAL)
    );
    println!("   Failed:     {}", s.failed.len());
    for (name, reason) in &s.failed {
        println!("     - {name}: {reason}");
    }
    if s.deletions_skipped > 0 {
        println!(
            "   Kept on camera: {} (local copies not verified)",
            s.deletions_skipped
        );
    }
}

/// Connect and list only; prints what a sync would fetch.
pub async fn cmd_plan(cfg: &RunConfig) -> Result<SyncReport> {
    println!(":: Checking camera for new files...");
    let associator = associate(cfg).await?;
    let report = while_associated(associator, async {
        let engine = build_engine(cfg)?;
        engine
            .preview(&cfg.dest_dir)
            .await
            .context("Failed to read the camera file list")
    })
    .await?;
    println!(
        "   Camera:   {} files listed ({} unique)",
        report.listing_total, report.remote_unique
    );
    println!("   Present:  {}", report.already_present());
    println!("   To fetch: {}", report.planned);
    Ok(report)
}

/// Prints visible networks, marking the ones that look like a camera.
pub async fn cmd_networks(prefixes: Vec<String>) -> Result<()> {
    println!(":: Scanning Wi-Fi networks...");
    let networks = tokio::task::spawn_blocking(move || -> Result<_> {
        let associator = platform_associator().context("Wi-Fi control unavailable")?;
        let networks = associator.scan().context("Wi-Fi scan failed")?;
        Ok(networks
            .into_iter()
            .map(|n| {
                let is_camera = matching_network(std::slice::from_ref(&n), &prefixes).is_some();
                (n, is_camera)
            })
            .collect::<Vec<_>>())
    })
    .await??;

    if networks.is_empty() {
        println!("   No networks found.");
    }
    for (network, is_camera) in &networks {
        let mark = if *is_camera { "*" } else { " " };
        println!(" {mark} {network}");
    }
    Ok(())
}
