//! The device side of the bridge: one TCP stream from the signal controller.
//!
//! [`serve_devices`] accepts controller connections forever. Only one is
//! tracked at a time in the [`DeviceSlot`]; a new connection replaces the
//! previous one, which is then closed. Each connection runs one reader
//! loop (bytes → [`LineDecoder`] → broadcast) and one writer task that
//! drains queued command lines onto the socket.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossroads_types::{DeviceId, LineDecoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::state::BridgeState;

/// Size of a single socket read.
const READ_CHUNK: usize = 4096;

/// The registered device connection, as seen from outside its task.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    /// Id of this connection.
    pub id: DeviceId,
    /// Remote address of the controller.
    pub addr: SocketAddr,
    /// When the connection was accepted.
    pub connected_at: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<String>,
    evict: Arc<Notify>,
}

impl DeviceHandle {
    /// Create a handle plus the receiver its writer drains and the signal
    /// its reader watches for eviction.
    pub fn new(addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<String>, Arc<Notify>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let evict = Arc::new(Notify::new());
        let handle = Self {
            id: DeviceId::new(),
            addr,
            connected_at: Utc::now(),
            outbound: tx,
            evict: Arc::clone(&evict),
        };
        (handle, rx, evict)
    }
}

/// Holder for the single active device connection.
#[derive(Debug, Default)]
pub struct DeviceSlot {
    current: Mutex<Option<DeviceHandle>>,
}

impl DeviceSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` as the active device. A previously registered
    /// connection is told to close and returned.
    pub async fn attach(&self, handle: DeviceHandle) -> Option<DeviceHandle> {
        let previous = self.current.lock().await.replace(handle);
        if let Some(prev) = &previous {
            prev.evict.notify_one();
        }
        previous
    }

    /// Clear the slot if `id` is still the active device.
    ///
    /// A replaced connection closing late must not evict its successor.
    pub async fn detach(&self, id: DeviceId) -> bool {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|h| h.id == id) {
            *current = None;
            true
        } else {
            false
        }
    }

    /// Queue one line for the active device.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DeviceUnavailable`] when no device is attached
    /// or its writer has stopped.
    pub async fn send_line(&self, line: String) -> Result<(), RelayError> {
        let current = self.current.lock().await;
        let handle = current.as_ref().ok_or(RelayError::DeviceUnavailable)?;
        handle
            .outbound
            .send(line)
            .map_err(|_closed| RelayError::DeviceUnavailable)
    }

    /// A snapshot of the active device, if any.
    pub async fn current(&self) -> Option<DeviceHandle> {
        self.current.lock().await.clone()
    }

    /// Drop the active device, asking its task to close.
    pub async fn clear(&self) {
        if let Some(handle) = self.current.lock().await.take() {
            handle.evict.notify_one();
        }
    }
}

/// Accept controller connections until the task is aborted.
pub async fn serve_devices(listener: TcpListener, state: Arc<BridgeState>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_device(stream, addr, Arc::clone(&state)));
            }
            Err(e) => {
                error!(error = %e, "failed to accept device connection");
            }
        }
    }
}

/// Run one device connection to completion.
///
/// Reads until end of stream, a socket error, or eviction by a newer
/// connection. Each complete line is decoded and broadcast; malformed
/// lines are logged and skipped. Unterminated trailing bytes are dropped.
pub async fn handle_device(stream: TcpStream, addr: SocketAddr, state: Arc<BridgeState>) {
    let (mut reader, writer) = stream.into_split();
    let (handle, outbound, evict) = DeviceHandle::new(addr);
    let id = handle.id;

    info!(device = %id, %addr, "device connected");
    if let Some(previous) = state.device.attach(handle).await {
        info!(device = %id, replaced = %previous.id, "device connection replaced");
    }

    tokio::spawn(write_lines(writer, outbound, id));

    let mut decoder = LineDecoder::new();
    let mut buf = vec![0_u8; READ_CHUNK];
    loop {
        let n = tokio::select! {
            () = evict.notified() => {
                info!(device = %id, "closing superseded device connection");
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!(device = %id, "device disconnected");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(device = %id, error = %e, "device socket error");
                    break;
                }
            },
        };

        let Some(chunk) = buf.get(..n) else {
            break;
        };
        for frame in decoder.decode(chunk) {
            match frame {
                Ok(value) => {
                    state.publish_traffic(value).await;
                }
                Err(e) => {
                    state.stats.record_malformed();
                    warn!(device = %id, error = %e, "dropping malformed device frame");
                }
            }
        }
    }

    if let Some(residue) = decoder.finish() {
        debug!(device = %id, bytes = residue.len(), "discarding partial device frame");
    }
    if state.device.detach(id).await {
        debug!(device = %id, "device slot cleared");
    }
}

/// Drain queued command lines onto the device socket.
async fn write_lines(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<String>,
    id: DeviceId,
) {
    while let Some(line) = outbound.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(device = %id, error = %e, "failed to write to device");
            return;
        }
    }
    debug!(device = %id, "device writer finished");
}
