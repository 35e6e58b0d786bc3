use serde::{Deserialize, Serialize};
use shared::{DEFAULT_ADVERTISE_PORT, DEFAULT_GAME_PORT, DEFAULT_MULTICAST_ADDRESS};
use std::net::Ipv4Addr;

/// Everything a server needs to start advertising and accepting clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Multicast group discovery requests are sent to
    pub multicast_address: Ipv4Addr,
    /// Local interface the group is joined on; unspecified lets the OS pick
    pub multicast_interface: Ipv4Addr,
    /// UDP port answering discovery requests, 0 for an ephemeral port
    pub advertise_port: u16,
    /// TCP port clients connect to, 0 for an ephemeral port
    pub game_port: u16,
    /// Number of slots, i.e. concurrently connected clients
    pub max_clients: usize,
    /// Name put into every advertisement
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            multicast_address: DEFAULT_MULTICAST_ADDRESS,
            multicast_interface: Ipv4Addr::UNSPECIFIED,
            advertise_port: DEFAULT_ADVERTISE_PORT,
            game_port: DEFAULT_GAME_PORT,
            max_clients: 5,
            name: "SuperServer".to_string(),
        }
    }
}
