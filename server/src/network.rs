//! Server lifecycle: start-up, per-call operations and teardown
//!
//! A running server owns two background tasks, the discovery responder and
//! the connection acceptor, plus one receive task per connected client.
//! None of them is cancelled directly. Each one waits on a `watch` channel
//! next to its socket call and returns as soon as the channel flips, which
//! is how `stop_advertising` and `deinit` unblock them before their sockets
//! are released.

use crate::acceptor;
use crate::config::ServerConfig;
use crate::error::{FatalErrorKind, ServerError};
use crate::handler::ServerHandler;
use crate::responder;
use crate::slots::{ClientId, SlotTable};
use log::{debug, error, info, warn};
use shared::{ConnectionLink, ServerDescriptor};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Lifecycle of a server handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Sockets are bound but background tasks are not running yet
    Uninitialized,
    /// Background tasks started; advertising and listening may be toggled off
    Running,
    /// Torn down; every operation reports `NotInitialized`
    Stopped,
}

#[derive(Default)]
struct BackgroundTasks {
    responder: Option<JoinHandle<()>>,
    acceptor: Option<JoinHandle<()>>,
}

/// State shared by the handle and every background task
pub(crate) struct Shared {
    pub(crate) descriptor: ServerDescriptor,
    /// Response datagram, built once at start-up
    pub(crate) advertisement: Vec<u8>,
    pub(crate) handler: Arc<dyn ServerHandler>,
    pub(crate) slots: RwLock<SlotTable<Arc<ConnectionLink>>>,
    /// True while discovery requests are answered
    pub(crate) advertising: watch::Sender<bool>,
    /// True while new connections are accepted
    pub(crate) listening: watch::Sender<bool>,
    state: RwLock<ServerState>,
    fatal_reported: AtomicBool,
    tasks: Mutex<BackgroundTasks>,
    advertise_addr: SocketAddr,
    game_addr: SocketAddr,
}

impl Shared {
    async fn ensure_running(&self) -> Result<(), ServerError> {
        if *self.state.read().await == ServerState::Running {
            Ok(())
        } else {
            Err(ServerError::NotInitialized)
        }
    }

    /// Switches advertising and listening off and waits for both tasks
    async fn stop_background(&self) {
        if self.advertising.send_replace(false) {
            info!("Stopping advertising");
        }
        if self.listening.send_replace(false) {
            info!("Stopping listening for clients");
        }

        let mut tasks = self.tasks.lock().await;
        if let Some(responder) = tasks.responder.take() {
            match responder.await {
                Ok(()) => info!("Advertising stopped"),
                Err(e) => error!("Advertise task failed: {}", e),
            }
        }
        if let Some(acceptor) = tasks.acceptor.take() {
            match acceptor.await {
                Ok(()) => info!("Listening stopped"),
                Err(e) => error!("Accept task failed: {}", e),
            }
        }
    }

    async fn teardown(&self) {
        {
            let mut state = self.state.write().await;
            if *state == ServerState::Stopped {
                return;
            }
            *state = ServerState::Stopped;
        }

        info!("Shutting down server");
        self.stop_background().await;

        // Receive tasks are not awaited; they see their link shut down and
        // find their slot already empty when they try to release it.
        let links = self.slots.write().await.drain();
        info!("Closing {} client connections", links.len());
        drop(links);
    }

    /// Reports an unrecoverable background failure and tears the server down
    ///
    /// Only the first report reaches the handler.
    pub(crate) fn fatal(self: &Arc<Self>, kind: FatalErrorKind, source: &io::Error) {
        if self.fatal_reported.swap(true, Ordering::SeqCst) {
            return;
        }

        error!("Fatal server error, {}: {}", kind, source);
        self.handler.on_fatal_error(kind);

        // The caller is one of the tasks teardown waits for, so it must not
        // wait for teardown itself.
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.teardown().await });
    }
}

/// Tears the server down once the last handle is dropped
struct Owner {
    shared: Arc<Shared>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        // Unblocks both background tasks even without a runtime to finish on
        self.shared.advertising.send_replace(false);
        self.shared.listening.send_replace(false);

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let shared = Arc::clone(&self.shared);
            runtime.spawn(async move { shared.teardown().await });
        }
    }
}

/// Handle to an advertising server
///
/// Cloning is cheap; all clones control the same server. Dropping the last
/// clone tears the server down in the background, as if `deinit` had been
/// called without waiting for it.
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
    _owner: Arc<Owner>,
}

impl Server {
    /// Binds both sockets, joins the multicast group and starts advertising
    ///
    /// A failure is reported to `handler.on_fatal_error` and returned; any
    /// socket bound so far is closed again.
    pub async fn init(
        config: ServerConfig,
        handler: Arc<dyn ServerHandler>,
    ) -> Result<Self, ServerError> {
        match Self::start(config, Arc::clone(&handler)).await {
            Ok(server) => Ok(server),
            Err(e) => {
                error!("{}", e);
                if let ServerError::Startup { kind, .. } = &e {
                    handler.on_fatal_error(*kind);
                }
                Err(e)
            }
        }
    }

    async fn start(
        config: ServerConfig,
        handler: Arc<dyn ServerHandler>,
    ) -> Result<Self, ServerError> {
        let advertise_socket = responder::bind_advertise_socket(&config)?;
        let advertise_addr = advertise_socket
            .local_addr()
            .map_err(ServerError::startup(FatalErrorKind::AdvertiseBind))?;

        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.game_port))
            .await
            .map_err(ServerError::startup(FatalErrorKind::GameListen))?;
        let game_addr = listener
            .local_addr()
            .map_err(ServerError::startup(FatalErrorKind::GameListen))?;

        let descriptor = ServerDescriptor::new(&config.name, game_addr.port());
        let advertisement = descriptor.encode_response();
        let (advertising, _) = watch::channel(true);
        let (listening, _) = watch::channel(true);

        let shared = Arc::new(Shared {
            descriptor,
            advertisement,
            handler,
            slots: RwLock::new(SlotTable::new(config.max_clients)),
            advertising,
            listening,
            state: RwLock::new(ServerState::Uninitialized),
            fatal_reported: AtomicBool::new(false),
            tasks: Mutex::new(BackgroundTasks::default()),
            advertise_addr,
            game_addr,
        });

        // Holding the task lock while spawning makes a teardown triggered by
        // an early fatal error wait until both handles are stored.
        {
            let mut tasks = shared.tasks.lock().await;
            *shared.state.write().await = ServerState::Running;
            tasks.acceptor = Some(tokio::spawn(acceptor::run(
                Arc::clone(&shared),
                listener,
            )));
            tasks.responder = Some(tokio::spawn(responder::run(
                Arc::clone(&shared),
                advertise_socket,
            )));
        }

        info!(
            "Server {:?} advertising on {} (group {}), game port {}, {} slots",
            shared.descriptor.name(),
            advertise_addr,
            config.multicast_address,
            game_addr.port(),
            config.max_clients
        );

        Ok(Server {
            _owner: Arc::new(Owner {
                shared: Arc::clone(&shared),
            }),
            shared,
        })
    }

    pub async fn state(&self) -> ServerState {
        *self.shared.state.read().await
    }

    /// The name and game port every discovery response carries
    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.shared.descriptor
    }

    /// Local address of the discovery socket
    pub fn advertise_addr(&self) -> SocketAddr {
        self.shared.advertise_addr
    }

    /// Local address clients connect to
    pub fn game_addr(&self) -> SocketAddr {
        self.shared.game_addr
    }

    pub fn is_advertising(&self) -> bool {
        *self.shared.advertising.borrow()
    }

    pub fn is_listening(&self) -> bool {
        *self.shared.listening.borrow()
    }

    /// Stops answering discovery requests and accepting new clients
    ///
    /// Waits until both background tasks have ended. Clients that are
    /// already connected stay connected. Calling it again is a no-op.
    pub async fn stop_advertising(&self) -> Result<(), ServerError> {
        self.shared.ensure_running().await?;
        self.shared.stop_background().await;
        Ok(())
    }

    /// Stops the server and closes every client connection
    ///
    /// The handle is unusable afterwards. Calling it again, or after a fatal
    /// error already tore the server down, does nothing.
    pub async fn deinit(&self) {
        self.shared.teardown().await;
    }

    /// Disconnects the client in slot `id`
    ///
    /// The slot is free for reuse once this returns. The client's receive
    /// task still reports `on_client_disconnected` when it ends.
    pub async fn remove_client(&self, id: ClientId) -> Result<(), ServerError> {
        self.shared.ensure_running().await?;

        let link = self.shared.slots.write().await.remove(id);
        match link {
            Some(link) => {
                drop(link);
                Ok(())
            }
            None => Err(ServerError::NotManaged(id)),
        }
    }

    /// Writes `data` to the client in slot `id`
    pub async fn send_message_to_client(
        &self,
        id: ClientId,
        data: &[u8],
    ) -> Result<(), ServerError> {
        self.shared.ensure_running().await?;

        let link = self
            .shared
            .slots
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(ServerError::NotManaged(id))?;

        debug!("Sending {} bytes to client {}", data.len(), id);
        link.send(data)
            .await
            .map_err(|source| ServerError::Send { id, source })
    }

    /// Writes `data` to every connected client
    ///
    /// A client that cannot be reached is logged and skipped; the others
    /// still get the message.
    pub async fn send_message(&self, data: &[u8]) -> Result<(), ServerError> {
        self.shared.ensure_running().await?;

        let capacity = self.shared.slots.read().await.capacity() as ClientId;
        for id in 0..capacity {
            match self.send_message_to_client(id, data).await {
                Ok(()) | Err(ServerError::NotManaged(_)) => {}
                Err(ServerError::NotInitialized) => return Err(ServerError::NotInitialized),
                Err(e) => warn!("Broadcast skipped client {}: {}", id, e),
            }
        }

        Ok(())
    }

    /// Ids of all currently occupied slots
    pub async fn connected_clients(&self) -> Vec<ClientId> {
        self.shared.slots.read().await.occupied()
    }
}
