use std::sync::Arc;
use std::time::Duration;

use camsync_core::{DeviceCommand, DeviceMessage, FileListing, ResponseStatus};
use tracing::{error, info, warn};

use super::{DeviceError, DeviceTransport, ResponseCorrelator, RetryPolicy};

/// Typed, timeout-bound operations against one device connection.
pub struct DeviceSession {
    transport: Arc<dyn DeviceTransport>,
    correlator: Arc<ResponseCorrelator>,
}

impl DeviceSession {
    /// Wires a fresh correlator into `transport`'s receive path.
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        let correlator = Arc::new(ResponseCorrelator::new());
        transport.register_observer(correlator.clone());
        Self {
            transport,
            correlator,
        }
    }

    pub fn correlator(&self) -> &Arc<ResponseCorrelator> {
        &self.correlator
    }

    pub async fn open(&self, policy: &RetryPolicy) -> Result<(), DeviceError> {
        let mut last = String::new();
        for attempt in 1..=policy.max_attempts {
            match self.transport.open().await {
                Ok(()) => {
                    info!(attempt, "connected to device");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, max = policy.max_attempts, "device connect failed: {e}");
                    last = e.to_string();
                }
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.backoff).await;
            }
        }
        Err(DeviceError::ConnectionFailed {
            attempts: policy.max_attempts,
            last,
        })
    }

    pub async fn list_files(&self, timeout: Duration) -> Result<FileListing, DeviceError> {
        let command = DeviceCommand::GetFileList;
        let code = command.code();
        let reply = self.call(command, timeout).await?;

        let listing =
            FileListing::from_payload(&reply.payload).map_err(|e| DeviceError::Protocol {
                code,
                detail: e.to_string(),
            })?;
        info!(
            uris = listing.uris.len(),
            total = listing.total_count,
            "received remote file list"
        );
        Ok(listing)
    }

    pub async fn delete_files(
        &self,
        uris: Vec<String>,
        timeout: Duration,
    ) -> Result<(), DeviceError> {
        let count = uris.len();
        self.call(DeviceCommand::DeleteFiles { uris }, timeout)
            .await?;
        info!(count, "deleted files on device");
        Ok(())
    }

    /// Best effort. Failures are logged, never returned.
    pub async fn close(&self) {
        match self.transport.close().await {
            Ok(()) => info!("device connection closed"),
            Err(e) => error!("error closing device connection: {e}"),
        }
    }

    async fn call(
        &self,
        command: DeviceCommand,
        timeout: Duration,
    ) -> Result<DeviceMessage, DeviceError> {
        let code = command.code();
        let transport = &self.transport;
        let reply = self
            .correlator
            .request(code, move || transport.send(command), timeout)
            .await?;

        if reply.status != ResponseStatus::Ok {
            return Err(DeviceError::Protocol {
                code,
                detail: format!("response status {:?}", reply.status),
            });
        }
        Ok(reply)
    }
}
