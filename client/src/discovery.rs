//! Server discovery over UDP
//!
//! A scan sends one discovery request to the configured address, normally
//! a multicast group, and collects well-formed responses until either the
//! result cap is reached or the scan window closes. The window is a single
//! deadline for the whole scan: a stream of junk datagrams cannot keep a
//! scan alive past it.

use crate::config::ClientConfig;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use shared::{decode_response, DISCOVERY_REQUEST, MAX_NAME_LEN};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

/// Position of a server in the results of the last scan
pub type ServerId = usize;

const RESPONSE_BUFFER_SIZE: usize = 1024;

/// A server that answered a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredServer {
    pub id: ServerId,
    /// Source address of the response, not anything the server claimed
    pub address: IpAddr,
    pub port: u16,
    pub name: String,
}

impl DiscoveredServer {
    /// Address to open the duplex connection to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// Creates the socket a scan sends from and listens on
fn open_scan_socket(config: &ClientConfig) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_loop_v4(true)?;
    socket.set_multicast_ttl_v4(config.multicast_ttl)?;
    if !config.multicast_interface.is_unspecified() {
        socket.set_multicast_if_v4(&config.multicast_interface)?;
    }
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}

/// Looks for servers for at most `window`
///
/// Returns at most `max_results` servers, further capped by
/// [`ClientConfig::max_servers`]. Ids follow arrival order starting at 0.
/// Network failures end the scan early with whatever was found so far.
pub async fn scan(config: &ClientConfig, max_results: usize, window: Duration) -> Vec<DiscoveredServer> {
    let limit = max_results.min(config.max_servers);
    let mut servers = Vec::new();
    if limit == 0 {
        return servers;
    }

    let socket = match open_scan_socket(config) {
        Ok(socket) => socket,
        Err(e) => {
            warn!("Failed to open discovery socket: {}", e);
            return servers;
        }
    };

    let target = SocketAddrV4::new(config.multicast_address, config.discovery_port);
    let deadline = Instant::now() + window;

    debug!("Sending discovery request to {}", target);
    if let Err(e) = socket.send_to(DISCOVERY_REQUEST, target).await {
        warn!("Failed to send discovery request to {}: {}", target, e);
        return servers;
    }

    let mut buffer = [0u8; RESPONSE_BUFFER_SIZE];
    while servers.len() < limit {
        let (len, responder) = match timeout_at(deadline, socket.recv_from(&mut buffer)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                warn!("Discovery receive failed: {}", e);
                break;
            }
            Err(_) => break,
        };

        let Some(descriptor) = decode_response(&buffer[..len], MAX_NAME_LEN) else {
            debug!("Ignoring {} byte datagram from {}", len, responder);
            continue;
        };

        let server = DiscoveredServer {
            id: servers.len(),
            address: responder.ip(),
            port: descriptor.game_port(),
            name: descriptor.name().to_string(),
        };
        info!(
            "Found server {:?} at {}:{}",
            server.name, server.address, server.port
        );
        servers.push(server);
    }

    debug!("Scan finished with {} server(s)", servers.len());
    servers
}
