pub mod sync;
pub mod tracker;

// Re-export core engine components
pub use sync::{DeletePolicy, SyncEngine, SyncError, SyncOptions, SyncReport};
pub use tracker::{ActiveDownload, ProgressTracker, TransferSnapshot};
