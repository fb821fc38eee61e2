use clap::Parser;
use client::network::{discover_server, ChatClient};
use log::info;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to; skips discovery when given
    #[arg(short = 's', long)]
    server: Option<SocketAddr>,

    /// UDP port to listen on for server announcements
    #[arg(short = 'd', long, default_value_t = shared::DISCOVERY_PORT)]
    discovery_port: u16,

    /// Seconds to wait for an announcement
    #[arg(short = 't', long, default_value = "10")]
    discovery_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let server_addr = match args.server {
        Some(addr) => addr,
        None => {
            info!("Searching for a server...");
            discover_server(
                args.discovery_port,
                Duration::from_secs(args.discovery_timeout),
            )
            .await?
            .addr()
        }
    };

    let client = ChatClient::connect(server_addr).await?;
    info!("Connected to {}. Type ~help for commands.", server_addr);
    client.run().await?;

    Ok(())
}
