//! Line-delimited JSON adapter for an external device-API bridge.
//!
//! The bridge process owns the camera's binary protocol. We exchange one JSON
//! object per line with it: [`DeviceCommand`] outbound, [`DeviceMessage`]
//! inbound.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use camsync_core::{DeviceCommand, DeviceMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{DeviceTransport, MessageObserver, TransportError};

type ObserverSlot = Arc<Mutex<Option<Arc<dyn MessageObserver>>>>;

struct Connection {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

pub struct BridgeTransport {
    addr: String,
    connect_timeout: Duration,
    observer: ObserverSlot,
    conn: tokio::sync::Mutex<Option<Connection>>,
}

impl BridgeTransport {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            observer: Arc::new(Mutex::new(None)),
            conn: tokio::sync::Mutex::new(None),
        }
    }
}

async fn read_loop(reader: OwnedReadHalf, observer: ObserverSlot) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<DeviceMessage>(&line) {
                    Ok(message) => {
                        let current = observer
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .clone();
                        match current {
                            Some(obs) => obs.observe(message),
                            None => debug!("no observer registered; message dropped"),
                        }
                    }
                    Err(e) => warn!("undecodable bridge message: {e}"),
                }
            }
            Ok(None) => {
                debug!("bridge closed the connection");
                break;
            }
            Err(e) => {
                warn!("bridge read failed: {e}");
                break;
            }
        }
    }
}

#[async_trait]
impl DeviceTransport for BridgeTransport {
    async fn open(&self) -> Result<(), TransportError> {
        let mut conn = self.conn.lock().await;
        if conn.is_some() {
            return Ok(());
        }

        let connect = TcpStream::connect(self.addr.as_str());
        let stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| TransportError::Connect(format!("{} timed out", self.addr)))?
            .map_err(|e| TransportError::Connect(format!("{}: {e}", self.addr)))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle on bridge socket: {e}");
        }

        let (read_half, writer) = stream.into_split();
        let reader = tokio::spawn(read_loop(read_half, self.observer.clone()));
        *conn = Some(Connection { writer, reader });
        info!(addr = %self.addr, "bridge connected");
        Ok(())
    }

    async fn send(&self, command: DeviceCommand) -> Result<(), TransportError> {
        let mut line =
            serde_json::to_vec(&command).map_err(|e| TransportError::Send(e.to_string()))?;
        line.push(b'\n');

        let mut conn = self.conn.lock().await;
        let conn = conn.as_mut().ok_or(TransportError::NotConnected)?;
        conn.writer.write_all(&line).await?;
        conn.writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let Some(mut conn) = self.conn.lock().await.take() else {
            return Ok(());
        };
        let res = conn.writer.shutdown().await;
        conn.reader.abort();
        res.map_err(|e| TransportError::Close(e.to_string()))
    }

    fn register_observer(&self, observer: Arc<dyn MessageObserver>) {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }
}
