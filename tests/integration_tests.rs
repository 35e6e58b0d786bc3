//! Integration tests for discovery and duplex sessions
//!
//! A real server and a real client talk over loopback. Scans are sent to the
//! server's discovery port by unicast, which the responder answers exactly
//! like a multicast request; the one test that needs multicast routing is
//! ignored by default.

use client::{Client, ClientConfig, ClientError, ClientHandler, DiscoveredServer, SessionState};
use server::{ClientId, FatalErrorKind, Server, ServerConfig, ServerHandler};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

#[derive(Debug, PartialEq)]
enum ServerEvent {
    Connected(ClientId),
    Disconnected(ClientId),
    Data(ClientId, Vec<u8>),
    Fatal(FatalErrorKind),
}

#[derive(Debug, PartialEq)]
enum ClientEvent {
    Connected(String),
    Data(Vec<u8>),
    Disconnected,
}

struct ServerEvents(mpsc::UnboundedSender<ServerEvent>);

impl ServerHandler for ServerEvents {
    fn on_client_connected(&self, client_id: ClientId) {
        let _ = self.0.send(ServerEvent::Connected(client_id));
    }

    fn on_client_disconnected(&self, client_id: ClientId) {
        let _ = self.0.send(ServerEvent::Disconnected(client_id));
    }

    fn on_data_received(&self, client_id: ClientId, data: &[u8]) {
        let _ = self.0.send(ServerEvent::Data(client_id, data.to_vec()));
    }

    fn on_fatal_error(&self, kind: FatalErrorKind) {
        let _ = self.0.send(ServerEvent::Fatal(kind));
    }
}

struct ClientEvents(mpsc::UnboundedSender<ClientEvent>);

impl ClientHandler for ClientEvents {
    fn on_connected(&self, server: &DiscoveredServer) {
        let _ = self.0.send(ClientEvent::Connected(server.name.clone()));
    }

    fn on_data_received(&self, data: &[u8]) {
        let _ = self.0.send(ClientEvent::Data(data.to_vec()));
    }

    fn on_disconnected(&self) {
        let _ = self.0.send(ClientEvent::Disconnected);
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn start_server(max_clients: usize) -> (Server, mpsc::UnboundedReceiver<ServerEvent>) {
    init_logging();
    let config = ServerConfig {
        multicast_interface: Ipv4Addr::LOCALHOST,
        advertise_port: 0,
        game_port: 0,
        max_clients,
        ..ServerConfig::default()
    };

    let (events, receiver) = mpsc::unbounded_channel();
    let server = Server::init(config, Arc::new(ServerEvents(events)))
        .await
        .expect("server failed to start");
    (server, receiver)
}

fn new_client(server: &Server) -> (Client, mpsc::UnboundedReceiver<ClientEvent>) {
    let config = ClientConfig {
        multicast_address: Ipv4Addr::LOCALHOST,
        multicast_interface: Ipv4Addr::LOCALHOST,
        discovery_port: server.advertise_addr().port(),
        ..ClientConfig::default()
    };

    let (events, receiver) = mpsc::unbounded_channel();
    (Client::new(config, Arc::new(ClientEvents(events))), receiver)
}

async fn next<T>(events: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// END-TO-END SESSION TESTS
mod session_tests {
    use super::*;

    /// Scan, connect, exchange bytes both ways and disconnect
    #[tokio::test]
    async fn discovery_and_duplex_exchange() {
        let (server, mut server_events) = start_server(5).await;
        let (client, mut client_events) = new_client(&server);

        let servers = client.scan(10, Duration::from_millis(500)).await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].id, 0);
        assert_eq!(servers[0].name, "SuperServer");
        assert_eq!(servers[0].port, server.game_addr().port());
        assert_eq!(servers[0].address, IpAddr::V4(Ipv4Addr::LOCALHOST));

        tokio_test::assert_ok!(client.connect(0).await);
        assert_eq!(
            next(&mut client_events).await,
            ClientEvent::Connected("SuperServer".to_string())
        );
        assert_eq!(next(&mut server_events).await, ServerEvent::Connected(0));

        tokio_test::assert_ok!(client.send_message(b"ping").await);
        assert_eq!(
            next(&mut server_events).await,
            ServerEvent::Data(0, b"ping".to_vec())
        );

        tokio_test::assert_ok!(server.send_message(b"pong").await);
        assert_eq!(
            next(&mut client_events).await,
            ClientEvent::Data(b"pong".to_vec())
        );

        tokio_test::assert_ok!(client.disconnect().await);
        assert_eq!(next(&mut client_events).await, ClientEvent::Disconnected);
        assert_eq!(next(&mut server_events).await, ServerEvent::Disconnected(0));
        assert!(server.connected_clients().await.is_empty());

        // The freed slot goes to the next connection
        tokio_test::assert_ok!(client.connect(0).await);
        assert_eq!(next(&mut server_events).await, ServerEvent::Connected(0));

        client.deinit().await;
        server.deinit().await;
    }

    /// Several clients get distinct ids and a unicast reaches only its target
    #[tokio::test]
    async fn messages_reach_the_addressed_client() {
        let (server, mut server_events) = start_server(5).await;
        let (first, mut first_events) = new_client(&server);
        let (second, mut second_events) = new_client(&server);

        for client in [&first, &second] {
            client.scan(1, Duration::from_millis(500)).await.unwrap();
            client.connect(0).await.unwrap();
        }
        assert_eq!(next(&mut server_events).await, ServerEvent::Connected(0));
        assert_eq!(next(&mut server_events).await, ServerEvent::Connected(1));
        next(&mut first_events).await;
        next(&mut second_events).await;

        tokio_test::assert_ok!(server.send_message_to_client(1, b"only you").await);
        assert_eq!(
            next(&mut second_events).await,
            ClientEvent::Data(b"only you".to_vec())
        );
        assert!(timeout(Duration::from_millis(100), first_events.recv())
            .await
            .is_err());

        first.deinit().await;
        second.deinit().await;
        server.deinit().await;
    }

    /// Removing a client on the server ends that client's session
    #[tokio::test]
    async fn server_side_removal_ends_session() {
        let (server, mut server_events) = start_server(5).await;
        let (client, mut client_events) = new_client(&server);

        client.scan(1, Duration::from_millis(500)).await.unwrap();
        client.connect(0).await.unwrap();
        assert_eq!(next(&mut server_events).await, ServerEvent::Connected(0));
        next(&mut client_events).await;

        tokio_test::assert_ok!(server.remove_client(0).await);
        assert_eq!(next(&mut client_events).await, ClientEvent::Disconnected);
        assert_eq!(client.state().await, SessionState::Disconnected);
        assert!(matches!(
            client.send_message(b"anyone?").await,
            Err(ClientError::NotConnected)
        ));

        server.deinit().await;
    }

    /// Server teardown closes every session
    #[tokio::test]
    async fn deinit_disconnects_clients() {
        let (server, mut server_events) = start_server(5).await;
        let (client, mut client_events) = new_client(&server);

        client.scan(1, Duration::from_millis(500)).await.unwrap();
        client.connect(0).await.unwrap();
        next(&mut server_events).await;
        next(&mut client_events).await;

        server.deinit().await;

        assert_eq!(next(&mut client_events).await, ClientEvent::Disconnected);
        assert_eq!(next(&mut server_events).await, ServerEvent::Disconnected(0));
    }
}

/// DISCOVERY TESTS
mod discovery_tests {
    use super::*;

    /// A server that stopped advertising is no longer found
    #[tokio::test]
    async fn stopped_server_is_not_found() {
        let (server, _server_events) = start_server(5).await;
        let (client, _client_events) = new_client(&server);

        tokio_test::assert_ok!(server.stop_advertising().await);
        assert!(!server.is_advertising());

        let started = Instant::now();
        let servers = client.scan(10, Duration::from_millis(300)).await.unwrap();
        assert!(servers.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(client.state().await, SessionState::Idle);

        server.deinit().await;
    }

    /// A full server stops advertising until it is restarted
    #[tokio::test]
    async fn full_server_stops_advertising() {
        let (server, mut server_events) = start_server(1).await;
        let (client, _client_events) = new_client(&server);

        client.scan(1, Duration::from_millis(500)).await.unwrap();
        client.connect(0).await.unwrap();
        assert_eq!(next(&mut server_events).await, ServerEvent::Connected(0));

        timeout(Duration::from_secs(2), async {
            while server.is_advertising() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("full server kept advertising");

        let (latecomer, _latecomer_events) = new_client(&server);
        let servers = latecomer.scan(10, Duration::from_millis(300)).await.unwrap();
        assert!(servers.is_empty());

        client.deinit().await;
        server.deinit().await;
    }

    /// Discovery through the real multicast group
    #[tokio::test]
    #[ignore = "requires multicast routing"]
    async fn multicast_discovery() {
        init_logging();
        let (events, _server_events) = mpsc::unbounded_channel();
        let server = Server::init(
            ServerConfig {
                game_port: 0,
                ..ServerConfig::default()
            },
            Arc::new(ServerEvents(events)),
        )
        .await
        .unwrap();

        let client = Client::new(ClientConfig::default(), Arc::new(client::NoopHandler));
        let servers = client.scan(10, Duration::from_millis(500)).await.unwrap();

        assert!(servers
            .iter()
            .any(|found| found.port == server.game_addr().port()));

        server.deinit().await;
    }
}
