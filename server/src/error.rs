use crate::slots::ClientId;
use std::io;
use thiserror::Error;

/// Failure that invalidates a whole server
///
/// Reported once through `ServerHandler::on_fatal_error`, after which the
/// server tears itself down.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalErrorKind {
    #[error("failed to bind the advertise socket")]
    AdvertiseBind,

    #[error("failed to join the multicast group")]
    MulticastJoin,

    #[error("failed to listen on the game port")]
    GameListen,

    #[error("failed to accept a client connection")]
    Accept,

    #[error("failed to receive a discovery request")]
    AdvertiseReceive,

    #[error("failed to send a discovery response")]
    AdvertiseSend,
}

/// Per-call failures; the server stays usable after any of these
/// except `Startup`, which is only returned by `Server::init`
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Server is not initialized")]
    NotInitialized,

    #[error("Client {0} is not managed by this server")]
    NotManaged(ClientId),

    #[error("Failed to send to client {id}")]
    Send {
        id: ClientId,
        #[source]
        source: io::Error,
    },

    #[error("Server failed to start: {kind}")]
    Startup {
        kind: FatalErrorKind,
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    /// Maps a start-up I/O failure to `Startup` with the given kind
    pub(crate) fn startup(kind: FatalErrorKind) -> impl FnOnce(io::Error) -> ServerError {
        move |source| ServerError::Startup { kind, source }
    }
}
