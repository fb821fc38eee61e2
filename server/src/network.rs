//! Server network layer: accepts TCP connections and runs the multiplexing loop

use crate::chat_log::{ChatLog, FileChatLog};
use crate::config::ServerConfig;
use crate::connection::ConnectionId;
use crate::discovery;
use crate::dispatcher::{dispatch, normalize_line, WELCOME_MESSAGE};
use crate::error::{bind_error, DeliveryError, Result, ServerError};
use crate::session::SessionTable;
use log::{debug, error, info, warn};
use shared::{decode_text, write_frame, FrameError};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Messages sent from per-connection tasks to the multiplexing loop
#[derive(Debug)]
pub enum ConnectionEvent {
    Data { id: ConnectionId, bytes: Vec<u8> },
    Closed { id: ConnectionId, reason: CloseReason },
}

#[derive(Debug)]
pub enum CloseReason {
    PeerShutdown,
    ReadFailed(io::Error),
    WriteFailed(FrameError),
    WriteTimedOut(Duration),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerShutdown => write!(f, "peer closed the connection"),
            CloseReason::ReadFailed(err) => write!(f, "read failed: {}", err),
            CloseReason::WriteFailed(err) => write!(f, "write failed: {}", err),
            CloseReason::WriteTimedOut(limit) => write!(f, "write stalled for {:?}", limit),
        }
    }
}

/// Chat server owning the listener, the session table and the discovery task
///
/// All session state is mutated from `run`, on a single task. Each connection
/// has a reader task feeding raw bytes in and a writer task draining its
/// outbound queue.
pub struct ChatServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    sessions: SessionTable,
    log: Box<dyn ChatLog + Send>,

    // Communication channel from connection tasks
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,

    discovery: Option<JoinHandle<()>>,
}

impl ChatServer {
    /// Binds the listener and starts discovery, logging to the configured files
    pub async fn init(config: ServerConfig) -> Result<Self> {
        let log = FileChatLog::new(&config.public_log, &config.command_log);
        Self::with_log(config, Box::new(log)).await
    }

    pub async fn with_log(config: ServerConfig, log: Box<dyn ChatLog + Send>) -> Result<Self> {
        config.validate()?;

        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|err| bind_error(addr.as_str(), err))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| ServerError::Setup(format!("no local address: {}", err)))?;
        info!("Server listening on {}", local_addr);

        let discovery = config
            .discovery
            .clone()
            .map(|discovery_config| discovery::spawn(discovery_config, local_addr.port()));

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(ChatServer {
            listener,
            local_addr,
            sessions: SessionTable::new(config.max_users),
            config,
            log,
            events_tx,
            events_rx,
            discovery,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Logs the hostname and resolved addresses for the operator
    pub async fn print_host_info(&self) {
        discovery::log_host_info(self.local_addr.port()).await;
    }

    /// Multiplexing loop: runs until a fatal accept error
    pub async fn run(&mut self) -> Result<()> {
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.accept_connection(stream, addr),
                        Err(err) if is_transient(&err) => {
                            warn!("Transient accept error: {}", err);
                        }
                        Err(err) => {
                            error!("Accept failed: {}", err);
                            return Err(ServerError::Accept(err));
                        }
                    }
                },

                event = self.events_rx.recv() => {
                    match event {
                        Some(ConnectionEvent::Data { id, bytes }) => self.handle_data(id, &bytes),
                        Some(ConnectionEvent::Closed { id, reason }) => self.handle_closed(id, reason),
                        // The server holds a sender, so the channel never closes while running
                        None => return Ok(()),
                    }
                },
            }
        }
    }

    /// Stops discovery and closes every connection and the listener
    pub fn shutdown(mut self) {
        if let Some(discovery) = self.discovery.take() {
            discovery.abort();
        }
        let closed = self.sessions.clear();
        info!("Server shut down, closed {} connection(s)", closed);
    }

    /// Queues `text` for a connection via its writer task
    pub fn send_text(&self, to: ConnectionId, text: &str) -> std::result::Result<(), DeliveryError> {
        match self.sessions.connection(to) {
            Some(connection) => connection.send_text(text),
            None => Err(DeliveryError::UnknownConnection(to)),
        }
    }

    fn accept_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_queue);
        let id = self.sessions.add_connection(addr, outbound_tx);

        let reader = tokio::spawn(read_loop(
            id,
            read_half,
            self.events_tx.clone(),
            self.config.read_buffer_size,
        ));
        let writer = tokio::spawn(write_loop(
            id,
            write_half,
            outbound_rx,
            self.events_tx.clone(),
            self.config.write_timeout,
        ));
        if let Some(connection) = self.sessions.connection_mut(id) {
            connection.attach_reader(reader.abort_handle());
            connection.attach_writer(writer.abort_handle());
        }

        if let Err(err) = self.send_text(id, WELCOME_MESSAGE) {
            warn!("Failed to send welcome message to connection {}: {}", id, err);
        }
    }

    /// Feeds bytes into the accumulator and dispatches every complete frame
    fn handle_data(&mut self, id: ConnectionId, bytes: &[u8]) {
        if !self.sessions.ingest(id, bytes) {
            debug!("Ignoring {} bytes for removed connection {}", bytes.len(), id);
            return;
        }

        while let Some(payload) = self.sessions.next_frame(id) {
            let text = match decode_text(&payload) {
                Ok(text) => text,
                Err(err) => {
                    warn!("Invalid message from connection {}: {}", id, err);
                    continue;
                }
            };
            debug!("[Client {}]: {}", id, text);

            let line = normalize_line(&text);
            let outcome = dispatch(&mut self.sessions, self.log.as_mut(), id, &line);

            for delivery in outcome.deliveries {
                self.deliver(delivery.to, &delivery.text);
            }
            if outcome.close {
                self.drop_connection(id);
                break;
            }
        }
    }

    fn handle_closed(&mut self, id: ConnectionId, reason: CloseReason) {
        if self.sessions.connection(id).is_none() {
            debug!("Connection {} already removed ({})", id, reason);
            return;
        }
        info!("Client {} disconnected: {}", id, reason);
        self.drop_connection(id);
    }

    /// Sends a reply, dropping peers whose queue is full or closed
    fn deliver(&mut self, to: ConnectionId, text: &str) {
        match self.send_text(to, text) {
            Ok(()) => {}
            Err(err) if err.is_fatal() => {
                warn!("Dropping connection {}: {}", to, err);
                self.abort_connection(to);
            }
            Err(err) => warn!("Frame to connection {} discarded: {}", to, err),
        }
    }

    /// Removing the connection releases its identity, closes its outbound
    /// queue (the writer flushes and shuts the stream) and aborts its reader.
    fn drop_connection(&mut self, id: ConnectionId) {
        self.sessions.remove_connection(id);
    }

    /// Like `drop_connection`, but discards queued frames and closes the
    /// socket without waiting on the peer.
    fn abort_connection(&mut self, id: ConnectionId) {
        if let Some(connection) = self.sessions.remove_connection(id) {
            connection.abort_writer();
        }
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        if let Some(discovery) = self.discovery.take() {
            discovery.abort();
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Forwards raw reads to the loop until EOF or error
async fn read_loop(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    buffer_size: usize,
) {
    let mut buffer = vec![0u8; buffer_size];

    loop {
        let event = match reader.read(&mut buffer).await {
            Ok(0) => ConnectionEvent::Closed {
                id,
                reason: CloseReason::PeerShutdown,
            },
            Ok(n) => ConnectionEvent::Data {
                id,
                bytes: buffer[..n].to_vec(),
            },
            Err(err) => ConnectionEvent::Closed {
                id,
                reason: CloseReason::ReadFailed(err),
            },
        };

        let closed = matches!(event, ConnectionEvent::Closed { .. });
        if events.send(event).is_err() || closed {
            break;
        }
    }
}

/// Writes queued payloads as frames; shuts the stream down once the queue closes
///
/// A frame that cannot be written within `write_timeout` ends the task, so a
/// peer that stops reading cannot pin the socket open.
async fn write_loop(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    write_timeout: Duration,
) {
    while let Some(payload) = outbound.recv().await {
        let reason = match timeout(write_timeout, write_frame(&mut writer, &payload)).await {
            Ok(Ok(_)) => continue,
            Ok(Err(err)) => CloseReason::WriteFailed(err),
            Err(_) => CloseReason::WriteTimedOut(write_timeout),
        };
        let _ = events.send(ConnectionEvent::Closed { id, reason });
        return;
    }

    if let Err(err) = writer.shutdown().await {
        debug!("Shutdown of connection {} failed: {}", id, err);
    }
}
