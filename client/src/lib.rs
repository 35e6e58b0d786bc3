//! # LAN Client Library
//!
//! Finds servers on the local network and talks to one of them.
//!
//! ## Discovery
//! [`Client::scan`] sends a single `Marco` datagram to the configured
//! multicast group and collects the `Polo` answers that arrive before the
//! scan window closes. Each answer becomes a [`DiscoveredServer`] whose id is
//! its position in the results. The address of a server is where its answer
//! came from.
//!
//! ## Sessions
//! [`Client::connect`] opens a TCP connection to one discovered server.
//! Raw bytes go out through [`Client::send_message`] and every read from the
//! server is handed to the application's [`ClientHandler`] from a background
//! receive task. A session ends when the application disconnects or the
//! server closes the connection, and the handler hears about it once.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::{Client, ClientConfig, NoopHandler};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::default(), Arc::new(NoopHandler));
//!
//!     let servers = client.scan(10, Duration::from_millis(500)).await?;
//!     if let Some(server) = servers.first() {
//!         client.connect(server.id).await?;
//!         client.send_message(b"hello").await?;
//!         client.disconnect().await?;
//!     }
//!
//!     client.deinit().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod network;

pub use config::ClientConfig;
pub use discovery::{DiscoveredServer, ServerId};
pub use error::ClientError;
pub use handler::{ClientHandler, NoopHandler};
pub use network::{Client, SessionState};
