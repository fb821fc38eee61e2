use crate::error::DeliveryError;
use shared::{encode_text, FrameBuffer};
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;

/// Unique handle for an accepted stream, assigned in accept order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// Live connection state
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    pub buffer: FrameBuffer,
    pub username: Option<String>,
    outbound: mpsc::Sender<Vec<u8>>,
    reader: Option<AbortHandle>,
    writer: Option<AbortHandle>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Connection {
            id,
            addr,
            connected_at: Instant::now(),
            buffer: FrameBuffer::new(),
            username: None,
            outbound,
            reader: None,
            writer: None,
        }
    }

    // The reader task is aborted when the connection is dropped
    pub fn attach_reader(&mut self, handle: AbortHandle) {
        self.reader = Some(handle);
    }

    // Left running on drop so queued frames are still flushed
    pub fn attach_writer(&mut self, handle: AbortHandle) {
        self.writer = Some(handle);
    }

    /// Stops the writer task at once, discarding whatever is still queued.
    /// Once the connection is dropped too, the socket is closed.
    pub fn abort_writer(&self) {
        if let Some(writer) = &self.writer {
            writer.abort();
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.username.is_some()
    }

    // Queue an already-terminated payload for the writer task
    pub fn queue(&self, payload: Vec<u8>) -> Result<(), DeliveryError> {
        self.outbound.try_send(payload).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::QueueFull(self.id),
            TrySendError::Closed(_) => DeliveryError::Closed(self.id),
        })
    }

    pub fn send_text(&self, text: &str) -> Result<(), DeliveryError> {
        let payload = encode_text(text)?;
        self.queue(payload)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
