use clap::Parser;
use log::{error, info};
use server::config::{DiscoveryConfig, ServerConfig};
use server::network::ChatServer;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the chat listener to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// TCP port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Maximum number of accounts that can be registered
    #[arg(short = 'u', long, default_value = "3")]
    max_users: usize,

    /// UDP port discovery announcements are sent to
    #[arg(long, default_value_t = shared::DISCOVERY_PORT)]
    discovery_port: u16,

    /// Seconds between discovery announcements
    #[arg(long, default_value = "5")]
    discovery_interval: u64,

    /// Disable the UDP discovery broadcaster
    #[arg(long)]
    no_discovery: bool,

    /// File public messages are appended to
    #[arg(long, default_value = "PublicMessages.log")]
    public_log: PathBuf,

    /// File recognised commands are audited to
    #[arg(long, default_value = "UserCommands.log")]
    command_log: PathBuf,

    /// Frames queued for a slow client before it is disconnected
    #[arg(long, default_value = "64")]
    outbound_queue: usize,

    /// Seconds a single frame write may stall before the client is dropped
    #[arg(long, default_value = "10")]
    write_timeout: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let discovery = (!self.no_discovery).then(|| DiscoveryConfig {
            port: self.discovery_port,
            interval: Duration::from_secs(self.discovery_interval),
            ..Default::default()
        });

        ServerConfig {
            host: self.host,
            port: self.port,
            max_users: self.max_users,
            discovery,
            public_log: self.public_log,
            command_log: self.command_log,
            outbound_queue: self.outbound_queue,
            write_timeout: Duration::from_secs(self.write_timeout),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.into_config();

    let mut server = match ChatServer::init(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to initialize server: {}", e);
            return Err(e.into());
        }
    };
    server.print_host_info().await;

    let result = tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            Ok(())
        }
    };

    server.shutdown();
    result?;
    Ok(())
}
