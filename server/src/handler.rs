use crate::error::FatalErrorKind;
use crate::slots::ClientId;

/// Callbacks a server reports its events through
///
/// All methods are called from the server's background tasks, so they must
/// return quickly. Events of one client arrive in order: connected, then
/// every received chunk, then disconnected. Nothing is ordered across
/// different clients.
pub trait ServerHandler: Send + Sync {
    /// A client was accepted and occupies slot `client_id`
    fn on_client_connected(&self, _client_id: ClientId) {}

    /// The connection in slot `client_id` ended and the slot is free again
    fn on_client_disconnected(&self, _client_id: ClientId) {}

    /// One read's worth of bytes from `client_id`
    fn on_data_received(&self, _client_id: ClientId, _data: &[u8]) {}

    /// Called at most once, right before the server tears itself down
    fn on_fatal_error(&self, _kind: FatalErrorKind) {}
}

/// Handler that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ServerHandler for NoopHandler {}
