//! UDP discovery broadcaster
//!
//! Periodically announces `"ServerIP: <ip> Port: <port>"` so clients can find
//! the server without prior configuration. The task never touches session state.

use crate::config::DiscoveryConfig;
use log::{debug, info, warn};
use shared::Announcement;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::{lookup_host, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Finds the address of the outbound interface, falling back to localhost
pub fn detect_local_ip() -> IpAddr {
    // Connecting a UDP socket selects a route without sending anything
    if let Ok(socket) = std::net::UdpSocket::bind("0.0.0.0:0") {
        if socket.connect("8.8.8.8:80").is_ok() {
            if let Ok(addr) = socket.local_addr() {
                return addr.ip();
            }
        }
    }

    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// Starts the broadcaster; abort the handle to stop it
pub fn spawn(config: DiscoveryConfig, tcp_port: u16) -> JoinHandle<()> {
    tokio::spawn(run(config, tcp_port))
}

pub async fn run(config: DiscoveryConfig, tcp_port: u16) {
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(err) => {
            warn!("Failed to create UDP discovery socket: {}", err);
            return;
        }
    };
    if let Err(err) = socket.set_broadcast(true) {
        warn!("Failed to enable UDP broadcast: {}", err);
        return;
    }

    let ip = config.advertised_ip.unwrap_or_else(detect_local_ip);
    let message = Announcement::new(ip, tcp_port).to_string();
    let target = SocketAddr::new(IpAddr::V4(config.broadcast_addr), config.port);
    info!(
        "Discovery broadcasting \"{}\" to {} every {:?}",
        message, target, config.interval
    );

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match socket.send_to(message.as_bytes(), target).await {
            Ok(_) => debug!("Discovery announcement sent to {}", target),
            Err(err) => warn!("UDP broadcast failed: {}", err),
        }
    }
}

/// Logs the hostname and every address it resolves to
pub async fn log_host_info(port: u16) {
    let host = match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            warn!("Failed to read hostname: {}", err);
            return;
        }
    };
    info!("Hostname: {}", host);

    let resolved = lookup_host((host.as_str(), port)).await;
    match resolved {
        Ok(addrs) => {
            info!("Resolved IP addresses:");
            for addr in addrs {
                let family = if addr.is_ipv4() { "IPv4" } else { "IPv6" };
                info!("  [{}] {}", family, addr);
            }
        }
        Err(err) => warn!("Address lookup for {} failed: {}", host, err),
    };
}
