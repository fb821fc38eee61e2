//! Error types for the chat server

use crate::connection::ConnectionId;
use shared::FrameError;
use std::io;
use thiserror::Error;

/// Result type alias for server lifecycle operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Failures that stop the server from starting or keep it from serving
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("setup failed: {0}")]
    Setup(String),
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

/// Reasons a registration or login request is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("username and password are required")]
    InvalidArgs,
    #[error("username already exists")]
    UsernameTaken,
    #[error("server has reached user capacity")]
    CapacityExceeded,
    #[error("username not found")]
    NotFound,
    #[error("incorrect password")]
    WrongPassword,
    #[error("user is already logged in elsewhere")]
    AlreadyLoggedIn,
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
}

/// Reasons an outbound frame could not be queued for a connection
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("outbound queue for connection {0} is full")]
    QueueFull(ConnectionId),
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
}

impl DeliveryError {
    /// True when the peer should be dropped rather than just losing this frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeliveryError::QueueFull(_) | DeliveryError::Closed(_))
    }
}

pub(crate) fn bind_error(addr: impl Into<String>, source: io::Error) -> ServerError {
    ServerError::Bind {
        addr: addr.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_error_fatality() {
        assert!(DeliveryError::QueueFull(ConnectionId(1)).is_fatal());
        assert!(DeliveryError::Closed(ConnectionId(1)).is_fatal());
        assert!(!DeliveryError::UnknownConnection(ConnectionId(1)).is_fatal());
        assert!(!DeliveryError::Frame(FrameError::TextTooLong(300)).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = bind_error(
            "0.0.0.0:1",
            io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        );
        assert_eq!(err.to_string(), "failed to bind 0.0.0.0:1: in use");
        assert_eq!(
            AuthError::UnknownConnection(ConnectionId(7)).to_string(),
            "unknown connection #7"
        );
    }
}
