//! Scripted in-memory transport for tests.
//!
//! Replies are queued per command code and delivered from a separate thread,
//! the way a real device client calls its observer from its own receive loop.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use camsync_core::{CommandCode, DeviceCommand, DeviceMessage};

use super::{DeviceTransport, MessageObserver, TransportError};

#[derive(Default)]
pub struct ScriptedTransport {
    observer: Mutex<Option<Arc<dyn MessageObserver>>>,
    replies: Mutex<HashMap<CommandCode, VecDeque<Vec<DeviceMessage>>>>,
    sent: Mutex<Vec<DeviceCommand>>,
    reply_delay: Mutex<Duration>,
    open_failures: AtomicU32,
    open_attempts: AtomicU32,
    close_calls: AtomicU32,
    fail_close: AtomicBool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the messages delivered after the next command with `code`.
    /// An empty batch means the device stays silent.
    pub fn reply(&self, code: CommandCode, messages: Vec<DeviceMessage>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(code)
            .or_default()
            .push_back(messages);
    }

    /// Fail the first `n` calls to `open`.
    pub fn fail_opens(&self, n: u32) {
        self.open_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    pub fn set_reply_delay(&self, delay: Duration) {
        *self
            .reply_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn sent(&self) -> Vec<DeviceCommand> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn open_attempts(&self) -> u32 {
        self.open_attempts.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn observer(&self) -> Option<Arc<dyn MessageObserver>> {
        self.observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DeviceTransport for ScriptedTransport {
    async fn open(&self) -> Result<(), TransportError> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.open_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.open_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Connect("scripted refusal".into()));
        }
        Ok(())
    }

    async fn send(&self, command: DeviceCommand) -> Result<(), TransportError> {
        let code = command.code();
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);

        let batch = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&code)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();

        let Some(observer) = self.observer() else {
            return Ok(());
        };
        if batch.is_empty() {
            return Ok(());
        }

        let delay = *self
            .reply_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            for message in batch {
                observer.observe(message);
            }
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Close("scripted close failure".into()));
        }
        Ok(())
    }

    fn register_observer(&self, observer: Arc<dyn MessageObserver>) {
        *self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }
}
