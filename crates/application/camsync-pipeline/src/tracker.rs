use camsync_infra::DownloadEvent;
use std::collections::VecDeque;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDownload {
    pub id: u64,
    pub file_name: String,
    pub bytes_downloaded: u64,
    /// Unknown when the camera sent no `content-length`.
    pub total_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TransferSnapshot {
    pub total_files: u64,
    pub completed_files: u64,
    pub failed_files: u64,
    pub downloaded_bytes: u64,
    pub speed_bps: u64,
    pub current: Option<ActiveDownload>,
}

/// Folds download events into running totals for display.
///
/// Downloads are sequential, so at most one file is in flight.
pub struct ProgressTracker {
    current: Option<ActiveDownload>,
    completed_files: u64,
    failed_files: u64,
    downloaded_bytes: u64,
    total_files: u64,
    last_tick: Instant,
    bytes_since_last_tick: u64,
    speed_bps: u64,
    history: VecDeque<u64>,
}

impl ProgressTracker {
    pub fn new(total_files: u64) -> Self {
        Self {
            current: None,
            completed_files: 0,
            failed_files: 0,
            downloaded_bytes: 0,
            total_files,
            last_tick: Instant::now(),
            bytes_since_last_tick: 0,
            speed_bps: 0,
            history: VecDeque::new(),
        }
    }

    pub fn update(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::Planned { total_files } => {
                self.total_files = total_files;
            }
            DownloadEvent::Started {
                id,
                name,
                total_bytes,
            } => {
                self.current = Some(ActiveDownload {
                    id,
                    file_name: name,
                    bytes_downloaded: 0,
                    total_bytes,
                });
            }
            DownloadEvent::Progress { id, bytes_delta } => {
                self.bytes_since_last_tick += bytes_delta;
                self.downloaded_bytes += bytes_delta;
                if let Some(entry) = self.current.as_mut().filter(|c| c.id == id) {
                    entry.bytes_downloaded += bytes_delta;
                }
            }
            DownloadEvent::Completed { id, success } => {
                if self.current.as_ref().is_some_and(|c| c.id == id) {
                    self.current = None;
                }
                if success {
                    self.completed_files += 1;
                } else {
                    self.failed_files += 1;
                }
            }
        }
    }

    pub fn get_snapshot(&mut self) -> TransferSnapshot {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick).as_secs_f64();

        if elapsed >= 0.5 {
            let current_bps = (self.bytes_since_last_tick as f64 / elapsed) as u64;
            self.history.push_back(current_bps);
            if self.history.len() > 5 {
                self.history.pop_front();
            }
            self.speed_bps =
                (self.history.iter().sum::<u64>() as f64 / self.history.len() as f64) as u64;
            self.last_tick = now;
            self.bytes_since_last_tick = 0;
        }

        TransferSnapshot {
            total_files: self.total_files,
            completed_files: self.completed_files,
            failed_files: self.failed_files,
            downloaded_bytes: self.downloaded_bytes,
            speed_bps: self.speed_bps,
            current: self.current.clone(),
        }
    }
}
