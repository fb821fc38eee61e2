//! Session table for the chat server
//!
//! This module owns all per-connection and per-account state:
//! - Live connections with their receive accumulators, keyed in accept order
//! - Registered identities (username/password pairs) for the process lifetime
//! - Session bindings between a live connection and an identity
//!
//! The table is owned by the multiplexing loop and only ever touched from that
//! single task, so none of it is locked.

use crate::connection::{Connection, ConnectionId};
use crate::error::AuthError;
use log::info;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Live connections, registered identities and the bindings between them
///
/// Connections are stored in a `BTreeMap` keyed by monotonically increasing
/// IDs, so every iteration (readiness processing, broadcast fan-out, user
/// listing) follows accept order.
#[derive(Debug)]
pub struct SessionTable {
    /// Live connections indexed by their handle
    connections: BTreeMap<ConnectionId, Connection>,
    /// Registered username -> password
    credentials: HashMap<String, String>,
    /// Next handle to hand out on accept
    next_connection_id: u64,
    /// Maximum number of identities that may ever be registered
    max_users: usize,
}

impl SessionTable {
    /// Creates an empty table that accepts at most `max_users` registrations
    pub fn new(max_users: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            credentials: HashMap::new(),
            next_connection_id: 1,
            max_users,
        }
    }

    /// Registers a freshly accepted stream and returns its handle
    ///
    /// `outbound` is the queue drained by the connection's writer task.
    pub fn add_connection(
        &mut self,
        addr: SocketAddr,
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;

        info!("Connection {} accepted from {}", id, addr);
        self.connections
            .insert(id, Connection::new(id, addr, outbound));
        id
    }

    /// Removes a connection, releasing any identity bound to it
    ///
    /// Dropping the returned value closes its outbound queue and aborts its
    /// reader task, which tears the transport down.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        let lifetime = connection.connected_at.elapsed();
        match &connection.username {
            Some(username) => {
                info!("Connection {} ({}) removed after {:?}", id, username, lifetime)
            }
            None => info!("Connection {} removed after {:?}", id, lifetime),
        }
        Some(connection)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Handles of every live connection in accept order
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Appends raw stream bytes to a connection's accumulator
    ///
    /// Returns false if the connection is no longer live.
    pub fn ingest(&mut self, id: ConnectionId, data: &[u8]) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) => {
                connection.buffer.extend(data);
                true
            }
            None => false,
        }
    }

    /// Pops the next complete frame payload buffered for a connection
    pub fn next_frame(&mut self, id: ConnectionId) -> Option<Vec<u8>> {
        self.connections.get_mut(&id)?.buffer.next_frame()
    }

    /// Stores a new identity
    ///
    /// Checks run in order: both fields present, capacity not reached,
    /// username not already taken.
    pub fn register(&mut self, username: &str, password: &str) -> Result<(), AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidArgs);
        }
        if self.credentials.len() >= self.max_users {
            return Err(AuthError::CapacityExceeded);
        }
        if self.credentials.contains_key(username) {
            return Err(AuthError::UsernameTaken);
        }

        self.credentials
            .insert(username.to_string(), password.to_string());
        info!("Registered user {}", username);
        Ok(())
    }

    /// Binds a connection to an identity after validating credentials
    ///
    /// Fails with `AlreadyLoggedIn` while any live connection holds the
    /// same username, which keeps at most one session per identity.
    pub fn login(
        &mut self,
        id: ConnectionId,
        username: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidArgs);
        }
        if !self.connections.contains_key(&id) {
            return Err(AuthError::UnknownConnection(id));
        }

        match self.credentials.get(username) {
            None => return Err(AuthError::NotFound),
            Some(stored) if stored != password => return Err(AuthError::WrongPassword),
            Some(_) => {}
        }

        if self.find_connection_by_username(username).is_some() {
            return Err(AuthError::AlreadyLoggedIn);
        }

        if let Some(connection) = self.connections.get_mut(&id) {
            connection.username = Some(username.to_string());
        }
        info!("Connection {} logged in as {}", id, username);
        Ok(())
    }

    /// Drops the identity binding and accumulated bytes for a connection
    ///
    /// The connection itself stays in the table; the caller decides when
    /// to remove it and tear down the transport. Returns the released name.
    pub fn logout(&mut self, id: ConnectionId) -> Option<String> {
        let connection = self.connections.get_mut(&id)?;
        connection.buffer.clear();
        let username = connection.username.take();
        if let Some(name) = &username {
            info!("Connection {} logged out from {}", id, name);
        }
        username
    }

    pub fn is_logged_in(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .map(Connection::is_logged_in)
            .unwrap_or(false)
    }

    pub fn display_name(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id)?.username.as_deref()
    }

    /// Usernames of every bound connection, in accept order of the connections
    pub fn list_logged_in(&self) -> Vec<String> {
        self.connections
            .values()
            .filter_map(|connection| connection.username.clone())
            .collect()
    }

    /// Finds the live connection bound to `username`
    ///
    /// Linear scan over live connections; fine for a handful of users.
    pub fn find_connection_by_username(&self, username: &str) -> Option<ConnectionId> {
        self.connections
            .values()
            .find(|connection| connection.username.as_deref() == Some(username))
            .map(|connection| connection.id)
    }

    /// Every authenticated connection other than `except`, in accept order
    pub fn authenticated_peers(&self, except: ConnectionId) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|connection| connection.id != except && connection.is_logged_in())
            .map(|connection| connection.id)
            .collect()
    }

    /// Drops every live connection, returning how many were open
    pub fn clear(&mut self) -> usize {
        let count = self.connections.len();
        self.connections.clear();
        count
    }

    pub fn user_count(&self) -> usize {
        self.credentials.len()
    }

    /// Returns the number of live connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if no connections are live
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
