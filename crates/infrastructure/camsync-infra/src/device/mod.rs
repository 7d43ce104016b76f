//! Device control surface.
//!
//! The camera speaks an asynchronous protocol: commands go out through
//! [`DeviceTransport::send`] and replies arrive later, on a thread the
//! transport owns, through a registered [`MessageObserver`].
//! [`ResponseCorrelator`] turns that into awaitable request/response calls
//! and [`DeviceSession`] layers the typed operations on top.

use async_trait::async_trait;
use camsync_core::{CommandCode, DeviceCommand, DeviceMessage};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod bridge;
pub mod correlator;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod session;

pub use bridge::BridgeTransport;
pub use correlator::ResponseCorrelator;
#[cfg(any(test, feature = "test-util"))]
pub use mock::ScriptedTransport;
pub use session::DeviceSession;

/// Errors raised by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("not connected")]
    NotConnected,
    #[error("send failed: {0}")]
    Send(String),
    #[error("close failed: {0}")]
    Close(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by device requests.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("could not connect to device after {attempts} attempts: {last}")]
    ConnectionFailed { attempts: u32, last: String },
    #[error("timed out after {timeout:?} waiting for {code}")]
    Timeout { code: CommandCode, timeout: Duration },
    #[error("device reported an error for {requested} (message code {reported})")]
    Device {
        requested: CommandCode,
        reported: CommandCode,
    },
    #[error("unexpected response to {code}: {detail}")]
    Protocol { code: CommandCode, detail: String },
    #[error("a request for {0} is already pending")]
    AlreadyPending(CommandCode),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Receives every message the transport decodes.
///
/// May be called from any thread, any number of times.
pub trait MessageObserver: Send + Sync {
    fn observe(&self, message: DeviceMessage);
}

#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn open(&self) -> Result<(), TransportError>;

    async fn send(&self, command: DeviceCommand) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    fn register_observer(&self, observer: Arc<dyn MessageObserver>);
}

/// Bounded retry for opening the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            camsync_config::DEFAULT_OPEN_ATTEMPTS,
            camsync_config::DEFAULT_OPEN_BACKOFF,
        )
    }
}
