pub mod device;
pub mod net;
pub mod wifi;

// Re-exports for convenience
pub use device::{DeviceError, DeviceSession, DeviceTransport, ResponseCorrelator, RetryPolicy};
pub use net::{default_http_client, DownloadEvent, Downloader, TransferError};
pub use wifi::{platform_associator, NetworkAssociator, NetworkId, WifiError};
