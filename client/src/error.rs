use crate::discovery::ServerId;
use crate::network::SessionState;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Server {0} was not found by the last scan")]
    NotManaged(ServerId),

    #[error("Failed to connect to {address}")]
    ConnectionFailure {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Not connected to a server")]
    NotConnected,

    #[error("Failed to send to the server")]
    Send(#[source] io::Error),

    #[error("Not allowed while the session is {0:?}")]
    InvalidState(SessionState),
}
