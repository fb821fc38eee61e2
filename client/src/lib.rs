//! # Chat Client Library
//!
//! A terminal client for the chat server. It finds the server through its UDP
//! discovery announcements (or takes an explicit address), then relays each
//! line typed on stdin as a frame and prints every frame the server sends.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{discover_server, ChatClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let announcement = discover_server(31337, Duration::from_secs(10)).await?;
//!     let client = ChatClient::connect(announcement.addr()).await?;
//!     client.run().await
//! }
//! ```

pub mod network;
