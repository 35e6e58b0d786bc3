use crate::discovery::DiscoveredServer;

/// Callbacks a client reports its session events through
///
/// `on_data_received` and the disconnect caused by the server closing the
/// connection are called from the session's receive task.
pub trait ClientHandler: Send + Sync {
    fn on_connected(&self, _server: &DiscoveredServer) {}

    /// One read's worth of bytes from the server
    fn on_data_received(&self, _data: &[u8]) {}

    /// Called exactly once per session, whoever ended it
    fn on_disconnected(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ClientHandler for NoopHandler {}
