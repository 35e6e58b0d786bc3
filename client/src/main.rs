use clap::Parser;
use client::{Client, ClientConfig, ClientHandler, DiscoveredServer};
use log::{info, warn};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file holding the client configuration; overrides the flags below
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address discovery requests are sent to
    #[arg(short, long, default_value = "224.0.0.26")]
    multicast: Ipv4Addr,

    /// Interface multicast requests leave through
    #[arg(short, long, default_value = "0.0.0.0")]
    interface: Ipv4Addr,

    /// UDP port servers answer discovery requests on
    #[arg(short, long, default_value = "6000")]
    port: u16,

    /// Maximum number of servers kept from the scan
    #[arg(long, default_value = "5")]
    max_servers: usize,

    /// How long the scan waits for answers, in milliseconds
    #[arg(short, long, default_value = "500")]
    timeout_ms: u64,

    /// Message sent to the first server found
    #[arg(long, default_value = "Ana are mere")]
    message: String,

    /// Seconds to wait for the server's reply before disconnecting
    #[arg(short, long, default_value = "1")]
    wait_secs: u64,

    /// Print the scan results as JSON on stdout
    #[arg(short, long)]
    json: bool,
}

struct Printer;

impl ClientHandler for Printer {
    fn on_connected(&self, server: &DiscoveredServer) {
        info!("Session with {:?} open", server.name);
    }

    fn on_data_received(&self, data: &[u8]) {
        info!(
            "Received {} bytes: {}",
            data.len(),
            String::from_utf8_lossy(data)
        );
    }

    fn on_disconnected(&self) {
        info!("Session closed");
    }
}

fn load_config(args: &Args) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    if let Some(path) = &args.config {
        let contents = std::fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&contents)?);
    }

    Ok(ClientConfig {
        multicast_address: args.multicast,
        multicast_interface: args.interface,
        discovery_port: args.port,
        max_servers: args.max_servers,
        ..ClientConfig::default()
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = load_config(&args)?;
    let max_servers = config.max_servers;

    let client = Client::new(config, Arc::new(Printer));

    info!("Scanning for servers...");
    let servers = client
        .scan(max_servers, Duration::from_millis(args.timeout_ms))
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&servers)?);
    }
    for server in &servers {
        info!(
            "[{}] {:?} at {}:{}",
            server.id, server.name, server.address, server.port
        );
    }

    let Some(server) = servers.first() else {
        warn!("No servers found");
        return Ok(());
    };

    client.connect(server.id).await?;
    client.send_message(args.message.as_bytes()).await?;

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.wait_secs)) => {}
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down gracefully..."),
    }

    if let Err(e) = client.disconnect().await {
        warn!("Disconnect: {}", e);
    }
    client.deinit().await;

    Ok(())
}
