use std::time::Duration;

use camsync_core::SyncSummary;
use camsync_infra::{DeviceError, RetryPolicy};

pub mod engine;
pub mod local;

pub use engine::SyncEngine;
pub use local::scan_local_files;

/// What happens to the camera's copy after a download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletePolicy {
    #[default]
    Never,
    /// Remove remote files whose local copy passed verification.
    AfterVerified,
}

impl DeletePolicy {
    pub fn from_setting(delete_after_download: bool) -> Self {
        if delete_after_download {
            DeletePolicy::AfterVerified
        } else {
            DeletePolicy::Never
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub list_timeout: Duration,
    pub delete_timeout: Duration,
    pub retry: RetryPolicy,
    pub delete_policy: DeletePolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            list_timeout: camsync_config::DEFAULT_LIST_TIMEOUT,
            delete_timeout: camsync_config::DEFAULT_DELETE_TIMEOUT,
            retry: RetryPolicy::default(),
            delete_policy: DeletePolicy::Never,
        }
    }
}

/// What one run saw and did.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// `total_count` as reported by the device.
    pub listing_total: u64,
    /// Distinct basenames in the listing.
    pub remote_unique: usize,
    pub planned: usize,
    pub summary: SyncSummary,
}

impl SyncReport {
    pub fn already_present(&self) -> usize {
        self.remote_unique.saturating_sub(self.planned)
    }
}

/// High-level error type for sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Local state error: {0}")]
    Local(String),
}
