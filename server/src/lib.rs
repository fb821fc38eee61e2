//! # Chat Server Library
//!
//! This library provides a multi-client TCP chat server. Clients exchange
//! length-prefixed text frames with the server, register and log in to an
//! account, and then chat publicly or privately with the other users online.
//!
//! ## Core Responsibilities
//!
//! ### Connection Multiplexing
//! A single loop owns all session state. Every accepted stream gets a reader
//! task that forwards raw bytes to the loop and a writer task that drains a
//! bounded outbound queue. The loop accumulates bytes per connection and
//! dispatches every complete frame in arrival order.
//!
//! ### Accounts and Sessions
//! Identities are username/password pairs registered at runtime, capped at a
//! configurable count. At most one live connection may be logged in to an
//! identity at a time; disconnecting releases it.
//!
//! ### Commands
//! Lines starting with `~` are commands (`~help`, `~register`, `~login`,
//! `~getlist`, `~logout`, `~send`, `~getlog`). Anything else is a public
//! message, broadcast to every other logged-in user and appended to the
//! public log.
//!
//! ### Discovery
//! A background task broadcasts `"ServerIP: <ip> Port: <port>"` over UDP so
//! clients on the local network can find the server.
//!
//! ## Module Organization
//!
//! - `config`: server and discovery settings
//! - `connection`: per-connection state and outbound queue
//! - `session`: the session table (connections, identities, bindings)
//! - `dispatcher`: command parsing and execution
//! - `chat_log`: public message log and command audit log
//! - `network`: listener, per-connection tasks and the multiplexing loop
//! - `discovery`: UDP announcement task and host diagnostics
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::ChatServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = ChatServer::init(ServerConfig::default()).await?;
//!     server.print_host_info().await;
//!
//!     // Runs until a fatal accept error
//!     let result = server.run().await;
//!     server.shutdown();
//!     result?;
//!     Ok(())
//! }
//! ```

pub mod chat_log;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod network;
pub mod session;
