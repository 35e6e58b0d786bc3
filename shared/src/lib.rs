//! Pieces used by both the advertising server and the discovering client:
//! the discovery datagram format and the connection link that turns a TCP
//! socket into a stoppable stream of reads.

pub mod link;
pub mod wire;

pub use link::{ConnectionLink, Link, LinkReader, READ_BUFFER_SIZE};
pub use wire::{
    decode_response, is_discovery_request, ServerDescriptor, DISCOVERY_REQUEST, MAX_NAME_LEN,
    RESPONSE_MAGIC,
};

/// Multicast group used when a configuration does not name one
pub const DEFAULT_MULTICAST_ADDRESS: std::net::Ipv4Addr = std::net::Ipv4Addr::new(224, 0, 0, 26);

/// Port servers listen on for discovery requests by default
pub const DEFAULT_ADVERTISE_PORT: u16 = 6000;

/// Port servers accept client connections on by default
pub const DEFAULT_GAME_PORT: u16 = 6001;
