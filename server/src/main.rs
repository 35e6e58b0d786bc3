use clap::Parser;
use log::{error, info, warn};
use server::{ClientId, FatalErrorKind, Server, ServerConfig, ServerHandler};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file holding the server configuration; overrides the flags below
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Multicast group to answer discovery requests on
    #[arg(short, long, default_value = "224.0.0.26")]
    multicast: Ipv4Addr,

    /// Interface to join the multicast group on
    #[arg(short, long, default_value = "0.0.0.0")]
    interface: Ipv4Addr,

    /// UDP port for discovery requests
    #[arg(short, long, default_value = "6000")]
    advertise_port: u16,

    /// TCP port clients connect to
    #[arg(short, long, default_value = "6001")]
    game_port: u16,

    /// Maximum number of concurrently connected clients
    #[arg(long, default_value = "5")]
    max_clients: usize,

    /// Name sent in every advertisement
    #[arg(short, long, default_value = "SuperServer")]
    name: String,

    /// Reply sent to every client after each message it sends
    #[arg(short, long, default_value = "Salut")]
    reply: String,

    /// Stop advertising as soon as the first client connects
    #[arg(long)]
    single_client: bool,
}

/// Events forwarded from the server's tasks to the main loop
#[derive(Debug)]
enum Event {
    Connected(ClientId),
    Disconnected(ClientId),
    Data(ClientId, Vec<u8>),
    Fatal(FatalErrorKind),
}

struct Forwarder {
    events: mpsc::UnboundedSender<Event>,
}

impl ServerHandler for Forwarder {
    fn on_client_connected(&self, client_id: ClientId) {
        let _ = self.events.send(Event::Connected(client_id));
    }

    fn on_client_disconnected(&self, client_id: ClientId) {
        let _ = self.events.send(Event::Disconnected(client_id));
    }

    fn on_data_received(&self, client_id: ClientId, data: &[u8]) {
        let _ = self.events.send(Event::Data(client_id, data.to_vec()));
    }

    fn on_fatal_error(&self, kind: FatalErrorKind) {
        let _ = self.events.send(Event::Fatal(kind));
    }
}

fn load_config(args: &Args) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    if let Some(path) = &args.config {
        let contents = std::fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&contents)?);
    }

    Ok(ServerConfig {
        multicast_address: args.multicast,
        multicast_interface: args.interface,
        advertise_port: args.advertise_port,
        game_port: args.game_port,
        max_clients: args.max_clients,
        name: args.name.clone(),
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

    let (events, mut event_rx) = mpsc::unbounded_channel();
    let server = Server::init(config, Arc::new(Forwarder { events })).await?;

    let mut connected = 0usize;

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(Event::Connected(id)) => {
                        connected += 1;
                        info!("Client {} connected, {} connected", id, connected);

                        if args.single_client {
                            if let Err(e) = server.stop_advertising().await {
                                warn!("Failed to stop advertising: {}", e);
                            }
                        }
                    }
                    Some(Event::Disconnected(id)) => {
                        connected = connected.saturating_sub(1);
                        info!("Client {} disconnected, {} connected", id, connected);
                    }
                    Some(Event::Data(id, data)) => {
                        info!(
                            "Received {} bytes from {}: {}",
                            data.len(),
                            id,
                            String::from_utf8_lossy(&data)
                        );
                        if let Err(e) = server.send_message_to_client(id, args.reply.as_bytes()).await {
                            warn!("Failed to reply to client {}: {}", id, e);
                        }
                    }
                    Some(Event::Fatal(kind)) => {
                        error!("Server stopped: {}", kind);
                        break;
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    server.deinit().await;

    Ok(())
}
