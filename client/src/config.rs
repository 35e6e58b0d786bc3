use serde::{Deserialize, Serialize};
use shared::{DEFAULT_ADVERTISE_PORT, DEFAULT_MULTICAST_ADDRESS};
use std::net::Ipv4Addr;

/// Where and how a client looks for servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Address discovery requests are sent to, normally a multicast group
    pub multicast_address: Ipv4Addr,
    /// Outgoing interface for multicast requests; unspecified lets the OS pick
    pub multicast_interface: Ipv4Addr,
    /// Port servers answer discovery requests on
    pub discovery_port: u16,
    /// Upper bound on servers kept from one scan
    pub max_servers: usize,
    /// Hop limit of discovery requests
    pub multicast_ttl: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            multicast_address: DEFAULT_MULTICAST_ADDRESS,
            multicast_interface: Ipv4Addr::UNSPECIFIED,
            discovery_port: DEFAULT_ADVERTISE_PORT,
            max_servers: 5,
            multicast_ttl: 1,
        }
    }
}
