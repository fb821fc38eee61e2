//! Runtime configuration for the chat server

use crate::error::{Result, ServerError};
use shared::{DEFAULT_PORT, DISCOVERY_INTERVAL, DISCOVERY_PORT};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// How the discovery broadcaster advertises the server
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// UDP port clients listen on for announcements
    pub port: u16,
    /// Time between announcements
    pub interval: Duration,
    /// Destination address, the limited broadcast address by default
    pub broadcast_addr: Ipv4Addr,
    /// Address to advertise instead of the detected one
    pub advertised_ip: Option<IpAddr>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DISCOVERY_PORT,
            interval: DISCOVERY_INTERVAL,
            broadcast_addr: Ipv4Addr::BROADCAST,
            advertised_ip: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Registered identities allowed for the lifetime of the process
    pub max_users: usize,
    /// None disables the discovery broadcaster
    pub discovery: Option<DiscoveryConfig>,
    pub public_log: PathBuf,
    pub command_log: PathBuf,
    /// Frames that may wait for a slow peer before it is disconnected
    pub outbound_queue: usize,
    /// Size of each raw read from a connection
    pub read_buffer_size: usize,
    /// Longest a single frame write may stall before the peer is dropped
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_users: 3,
            discovery: Some(DiscoveryConfig::default()),
            public_log: PathBuf::from("PublicMessages.log"),
            command_log: PathBuf::from("UserCommands.log"),
            outbound_queue: 64,
            read_buffer_size: 1024,
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_users == 0 {
            return Err(ServerError::Setup("max_users must be at least 1".to_string()));
        }
        if self.outbound_queue == 0 {
            return Err(ServerError::Setup(
                "outbound_queue must be at least 1".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ServerError::Setup(
                "read_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.write_timeout.is_zero() {
            return Err(ServerError::Setup(
                "write_timeout must be non-zero".to_string(),
            ));
        }
        if let Some(discovery) = &self.discovery {
            if discovery.interval.is_zero() {
                return Err(ServerError::Setup(
                    "discovery interval must be non-zero".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 31337);
        assert_eq!(config.max_users, 3);
        assert_eq!(config.bind_addr(), "0.0.0.0:31337");
        assert_eq!(config.write_timeout, Duration::from_secs(10));

        let discovery = config.discovery.unwrap();
        assert_eq!(discovery.port, 31337);
        assert_eq!(discovery.interval, Duration::from_secs(5));
        assert_eq!(discovery.broadcast_addr, Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_validate() {
        assert!(ServerConfig::default().validate().is_ok());

        let zero_users = ServerConfig {
            max_users: 0,
            ..Default::default()
        };
        assert!(matches!(zero_users.validate(), Err(ServerError::Setup(_))));

        let zero_queue = ServerConfig {
            outbound_queue: 0,
            ..Default::default()
        };
        assert!(zero_queue.validate().is_err());

        let no_write_timeout = ServerConfig {
            write_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(no_write_timeout.validate().is_err());

        let busy_discovery = ServerConfig {
            discovery: Some(DiscoveryConfig {
                interval: Duration::ZERO,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(busy_discovery.validate().is_err());
    }
}
