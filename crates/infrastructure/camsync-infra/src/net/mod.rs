use std::time::Instant;

use camino::Utf8Path;
use camsync_core::{SyncPlan, SyncSummary, TransferOutcome, TransferResult};
use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::Sender;
use tracing::{error, info, warn};

use camsync_config::{DOWNLOAD_BUFFER_BYTES, HTTP_CONNECT_TIMEOUT, HTTP_READ_TIMEOUT};

/// Client with the connect/read bounds used for camera downloads.
pub fn default_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .read_timeout(HTTP_READ_TIMEOUT)
        .build()
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("body ended after {written} of {expected} bytes")]
    Truncated { written: u64, expected: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Sent once, before the first file, with the number of plan entries.
    Planned {
        total_files: u64,
    },
    /// `total_bytes` is the response `content-length`, when the server sent one.
    Started {
        id: u64,
        name: String,
        total_bytes: Option<u64>,
    },
    Progress {
        id: u64,
        bytes_delta: u64,
    },
    Completed {
        id: u64,
        success: bool,
    },
}

/// Coalesces per-chunk progress before it goes on the channel.
struct ProgressEmitter<'a> {
    id: u64,
    name: &'a str,
    tx: Option<&'a Sender<DownloadEvent>>,
    started: bool,
    accumulated: u64,
    last_emit: Instant,
}

impl<'a> ProgressEmitter<'a> {
    fn new(id: u64, name: &'a str, tx: Option<&'a Sender<DownloadEvent>>) -> Self {
        Self {
            id,
            name,
            tx,
            started: false,
            accumulated: 0,
            last_emit: Instant::now(),
        }
    }

    async fn emit(&self, event: DownloadEvent) {
        if let Some(tx) = self.tx {
            let _ = tx.send(event).await;
        }
    }

    async fn started(&mut self, total_bytes: Option<u64>) {
        self.started = true;
        self.emit(DownloadEvent::Started {
            id: self.id,
            name: self.name.to_string(),
            total_bytes,
        })
        .await;
    }

    async fn progress(&mut self, len: u64) {
        self.accumulated += len;
        if self.accumulated > 1_000_000 || self.last_emit.elapsed().as_millis() > 100 {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if self.accumulated > 0 {
            self.emit(DownloadEvent::Progress {
                id: self.id,
                bytes_delta: self.accumulated,
            })
            .await;
            self.accumulated = 0;
            self.last_emit = Instant::now();
        }
    }

    async fn finish(mut self, success: bool) {
        if !self.started {
            self.started(None).await;
        }
        self.flush().await;
        self.emit(DownloadEvent::Completed {
            id: self.id,
            success,
        })
        .await;
    }
}

/// Streams planned files from the camera's HTTP server into a directory.
pub struct Downloader {
    client: Client,
    base_url: String,
}

impl Downloader {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn file_url(&self, uri: &str) -> String {
        build_file_url(&self.base_url, uri)
    }

    /// Downloads every plan entry in order. A failed file is recorded in the
    /// summary and the loop moves on.
    pub async fn download_all(
        &self,
        plan: &SyncPlan,
        dest_dir: &Utf8Path,
        progress_tx: Option<Sender<DownloadEvent>>,
    ) -> SyncSummary {
        if let Some(tx) = &progress_tx {
            let _ = tx
                .send(DownloadEvent::Planned {
                    total_files: plan.len() as u64,
                })
                .await;
        }

        let mut results = Vec::with_capacity(plan.len());
        for (idx, (name, uri)) in plan.iter().enumerate() {
            let res = self
                .download_one(idx as u64, name, uri, dest_dir, progress_tx.as_ref())
                .await;
            results.push(res);
        }

        let summary = SyncSummary::from_results(results);
        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            bytes = summary.bytes_written,
            "download pass finished"
        );
        summary
    }

    async fn download_one(
        &self,
        id: u64,
        name: &str,
        uri: &str,
        dest_dir: &Utf8Path,
        tx: Option<&Sender<DownloadEvent>>,
    ) -> TransferResult {
        let url = self.file_url(uri);
        let target = dest_dir.join(name);
        let part = dest_dir.join(format!("{name}.part"));
        info!(%url, "downloading {name}");

        let mut emitter = ProgressEmitter::new(id, name, tx);
        let mut written = 0u64;
        let mut expected_len = None;

        let res = self
            .fetch(
                &url,
                &part,
                &target,
                &mut emitter,
                &mut written,
                &mut expected_len,
            )
            .await;

        let outcome = match res {
            Ok(()) => {
                info!(bytes = written, "downloaded {name}");
                TransferOutcome::Success
            }
            Err(e) => {
                error!(%url, "failed to download {name}: {e}");
                if let Err(rm) = tokio::fs::remove_file(part.as_std_path()).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("could not remove partial file {part}: {rm}");
                    }
                }
                TransferOutcome::Failed(e.to_string())
            }
        };

        emitter.finish(outcome == TransferOutcome::Success).await;

        TransferResult {
            name: name.to_string(),
            uri: uri.to_string(),
            bytes_written: written,
            expected_len,
            outcome,
        }
    }

    async fn fetch(
        &self,
        url: &str,
        part: &Utf8Path,
        target: &Utf8Path,
        emitter: &mut ProgressEmitter<'_>,
        written: &mut u64,
        expected_len: &mut Option<u64>,
    ) -> Result<(), TransferError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransferError::Status(status));
        }

        *expected_len = resp.content_length();
        emitter.started(*expected_len).await;

        let file = File::create(part.as_std_path()).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFFER_BYTES, file);
        let mut body = resp.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            let len = chunk.len() as u64;
            *written += len;
            emitter.progress(len).await;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        if let Some(expected) = *expected_len {
            if *written != expected {
                return Err(TransferError::Truncated {
                    written: *written,
                    expected,
                });
            }
        }

        tokio::fs::rename(part.as_std_path(), target.as_std_path()).await?;
        Ok(())
    }
}

fn build_file_url(base_url: &str, uri: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        uri.trim_start_matches('/')
    )
}
