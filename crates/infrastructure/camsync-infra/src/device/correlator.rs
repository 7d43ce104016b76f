use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camsync_core::{CommandCode, DeviceMessage};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::{DeviceError, MessageObserver, TransportError};

struct Slot {
    ticket: u64,
    tx: oneshot::Sender<DeviceMessage>,
}

/// Matches pushed device messages to the request waiting for them.
///
/// At most one request per [`CommandCode`] may be outstanding.
#[derive(Default)]
pub struct ResponseCorrelator {
    pending: Mutex<HashMap<CommandCode, Slot>>,
    next_ticket: AtomicU64,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<CommandCode, Slot>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for `code`, run `send`, then wait for the reply,
    /// all within `timeout`.
    ///
    /// The slot is registered before `send` runs, so a reply that arrives
    /// while `send` is still in flight is kept. The slot is always released
    /// when this future completes or is dropped.
    pub async fn request<F, Fut>(
        &self,
        code: CommandCode,
        send: F,
        timeout: Duration,
    ) -> Result<DeviceMessage, DeviceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), TransportError>>,
    {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        {
            let mut slots = self.slots();
            if slots.contains_key(&code) {
                return Err(DeviceError::AlreadyPending(code));
            }
            slots.insert(code, Slot { ticket, tx });
        }
        let _release = SlotRelease {
            correlator: self,
            code,
            ticket,
        };

        // One bound covers both the send and the wait for the reply.
        let exchange = async {
            send().await?;
            rx.await.map_err(|_| DeviceError::Protocol {
                code,
                detail: "response slot dropped without a message".to_string(),
            })
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(message)) if message.is_error() => Err(DeviceError::Device {
                requested: code,
                reported: message.code,
            }),
            Ok(result) => result,
            Err(_) => {
                warn!(%code, ?timeout, "no response from device");
                Err(DeviceError::Timeout { code, timeout })
            }
        }
    }

    /// Feed one message from the transport's receive path.
    pub fn observe(&self, message: DeviceMessage) {
        let mut slots = self.slots();

        if message.is_error() {
            if let Some(slot) = slots.remove(&message.code) {
                error!(code = %message.code, payload = %message.payload, "device returned an error");
                let _ = slot.tx.send(message);
                return;
            }
            if slots.is_empty() {
                warn!(code = %message.code, "error response with no pending request");
                return;
            }
            // Error codes are not reliably echoed, so fail whoever is waiting.
            error!(
                code = %message.code,
                pending = slots.len(),
                "device returned an uncorrelated error; failing pending requests"
            );
            for (_, slot) in slots.drain() {
                let _ = slot.tx.send(message.clone());
            }
            return;
        }

        match slots.remove(&message.code) {
            Some(slot) => {
                debug!(code = %message.code, status = ?message.status, "correlated response");
                if slot.tx.send(message).is_err() {
                    debug!("waiter already gone; response discarded");
                }
            }
            None => {
                debug!(
                    code = %message.code,
                    status = ?message.status,
                    "no pending request; message discarded"
                );
            }
        }
    }

    pub fn is_pending(&self, code: CommandCode) -> bool {
        self.slots().contains_key(&code)
    }

    pub fn pending_count(&self) -> usize {
        self.slots().len()
    }
}

impl MessageObserver for ResponseCorrelator {
    fn observe(&self, message: DeviceMessage) {
        ResponseCorrelator::observe(self, message);
    }
}

struct SlotRelease<'a> {
    correlator: &'a ResponseCorrelator,
    code: CommandCode,
    ticket: u64,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        let mut slots = self.correlator.slots();
        if slots.get(&self.code).map(|s| s.ticket) == Some(self.ticket) {
            slots.remove(&self.code);
        }
    }
}
