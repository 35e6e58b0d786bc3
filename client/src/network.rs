use crate::config::ClientConfig;
use crate::discovery::{self, DiscoveredServer, ServerId};
use crate::error::ClientError;
use crate::handler::ClientHandler;
use log::{debug, info};
use shared::{ConnectionLink, LinkReader};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::RwLock;

/// Where a client is in its scan and connect cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Disconnected,
}

/// The one live connection of a client
struct Session {
    generation: u64,
    link: Arc<ConnectionLink>,
    server: DiscoveredServer,
}

enum Phase {
    Idle,
    Scanning,
    Connecting,
    Connected(Session),
    Disconnected,
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Scanning => SessionState::Scanning,
            Phase::Connecting => SessionState::Connecting,
            Phase::Connected(_) => SessionState::Connected,
            Phase::Disconnected => SessionState::Disconnected,
        }
    }
}

struct Shared {
    config: ClientConfig,
    handler: Arc<dyn ClientHandler>,
    servers: RwLock<Vec<DiscoveredServer>>,
    phase: RwLock<Phase>,
    next_generation: AtomicU64,
}

impl Shared {
    /// Moves out of Idle or Disconnected into `next`
    async fn begin(&self, next: Phase) -> Result<(), ClientError> {
        let mut phase = self.phase.write().await;
        match &*phase {
            Phase::Idle | Phase::Disconnected => {}
            other => return Err(ClientError::InvalidState(other.state())),
        }
        *phase = next;
        Ok(())
    }

    /// Ends the current session
    ///
    /// With a generation, only the session started as that generation is
    /// ended. The session is taken out under the lock, so of several callers
    /// racing to end the same session exactly one gets true and reports the
    /// disconnect.
    async fn end_session(&self, generation: Option<u64>) -> bool {
        let mut phase = self.phase.write().await;
        let owned = matches!(
            &*phase,
            Phase::Connected(session) if generation.map_or(true, |g| g == session.generation)
        );
        if !owned {
            return false;
        }

        let Phase::Connected(session) = std::mem::replace(&mut *phase, Phase::Disconnected) else {
            return false;
        };
        drop(phase);

        session.link.shutdown();
        info!(
            "Disconnected from {:?} at {}",
            session.server.name,
            session.link.peer_addr()
        );
        drop(session);

        self.handler.on_disconnected();
        true
    }
}

/// Client side of discovery and of one duplex session
///
/// A client scans for servers, connects to one of the servers the last scan
/// found, exchanges raw bytes with it and disconnects. It holds at most one
/// session at a time. Dropping the client closes an open session.
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    pub fn new(config: ClientConfig, handler: Arc<dyn ClientHandler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                handler,
                servers: RwLock::new(Vec::new()),
                phase: RwLock::new(Phase::Idle),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.shared.phase.read().await.state()
    }

    /// Runs a scan and keeps its results for [`connect`](Client::connect)
    ///
    /// Finding nothing is not an error. The previous results are replaced
    /// either way.
    pub async fn scan(
        &self,
        max_results: usize,
        window: Duration,
    ) -> Result<Vec<DiscoveredServer>, ClientError> {
        self.shared.begin(Phase::Scanning).await?;

        let servers = discovery::scan(&self.shared.config, max_results, window).await;
        *self.shared.servers.write().await = servers.clone();
        *self.shared.phase.write().await = Phase::Idle;

        Ok(servers)
    }

    /// Results of the last scan
    pub async fn discovered_servers(&self) -> Vec<DiscoveredServer> {
        self.shared.servers.read().await.clone()
    }

    /// Opens a session to a server found by the last scan
    pub async fn connect(&self, server_id: ServerId) -> Result<(), ClientError> {
        let server = self
            .shared
            .servers
            .read()
            .await
            .get(server_id)
            .cloned()
            .ok_or(ClientError::NotManaged(server_id))?;

        self.shared.begin(Phase::Connecting).await?;

        let address = server.socket_addr();
        info!("Connecting to {:?} at {}", server.name, address);

        let opened = match TcpStream::connect(address).await {
            Ok(stream) => ConnectionLink::open(stream),
            Err(e) => Err(e),
        };
        let (link, reader) = match opened {
            Ok(opened) => opened,
            Err(source) => {
                *self.shared.phase.write().await = Phase::Idle;
                return Err(ClientError::ConnectionFailure { address, source });
            }
        };

        let generation = self.shared.next_generation.fetch_add(1, Ordering::SeqCst);
        *self.shared.phase.write().await = Phase::Connected(Session {
            generation,
            link: Arc::new(link),
            server: server.clone(),
        });

        info!("Connected to {:?}", server.name);
        self.shared.handler.on_connected(&server);

        tokio::spawn(receive(Arc::clone(&self.shared), generation, reader));
        Ok(())
    }

    /// Ends the current session
    ///
    /// Fails with [`ClientError::NotConnected`] if there is none, including
    /// when the server already closed it.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        if self.shared.end_session(None).await {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// Writes all of `data` to the connected server
    pub async fn send_message(&self, data: &[u8]) -> Result<(), ClientError> {
        let link = match &*self.shared.phase.read().await {
            Phase::Connected(session) => Arc::clone(&session.link),
            _ => return Err(ClientError::NotConnected),
        };

        debug!("Sending {} bytes to {}", data.len(), link.peer_addr());
        link.send(data).await.map_err(ClientError::Send)
    }

    /// Server behind the current session
    pub async fn connected_server(&self) -> Option<DiscoveredServer> {
        match &*self.shared.phase.read().await {
            Phase::Connected(session) => Some(session.server.clone()),
            _ => None,
        }
    }

    /// Disconnects if needed and releases the client
    pub async fn deinit(self) {
        if self.shared.end_session(None).await {
            debug!("Session closed during deinit");
        }
    }
}

impl Drop for Client {
    /// Ends a session that is still open, without waiting for its task
    fn drop(&mut self) {
        // Only a receive task can hold the lock here, and it is already
        // ending the session itself.
        let Ok(mut phase) = self.shared.phase.try_write() else {
            return;
        };
        if !matches!(&*phase, Phase::Connected(_)) {
            return;
        }
        let Phase::Connected(session) = std::mem::replace(&mut *phase, Phase::Disconnected) else {
            return;
        };
        drop(phase);

        session.link.shutdown();
        info!("Dropped client closes session with {:?}", session.server.name);
        drop(session);

        self.shared.handler.on_disconnected();
    }
}

/// Receive loop of the session started as `generation`
async fn receive(shared: Arc<Shared>, generation: u64, mut reader: LinkReader) {
    while let Some(data) = reader.read().await {
        shared.handler.on_data_received(data);
    }

    let peer_addr = reader.peer_addr();
    drop(reader);

    if shared.end_session(Some(generation)).await {
        info!("Connection to {} closed by the server", peer_addr);
    }
}
