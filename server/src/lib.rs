//! # LAN Server Library
//!
//! Advertises a server on a multicast group and exchanges raw bytes with the
//! clients that find it and connect.
//!
//! ## Core Responsibilities
//!
//! ### Advertising
//! A UDP socket bound to the advertise port joins the configured multicast
//! group. Every `Marco` request is answered with a `Polo` datagram carrying
//! the game port and server name, prepared once at start-up.
//!
//! ### Client Management
//! A TCP listener on the game port hands each accepted connection the lowest
//! free slot of a fixed-size table. The slot index is the client id used by
//! every other call. Freed slots are reused by later connections.
//!
//! ### Data Delivery
//! Each connected client gets its own receive task which hands every read to
//! the application's [`ServerHandler`]. Bytes are delivered as they were
//! read; no message framing is applied in either direction.
//!
//! ## Architecture Design
//!
//! ### One Task Per Blocking Loop
//! The responder, the acceptor and every client reader run as separate tokio
//! tasks. A task parked on a socket call is stopped by flipping the `watch`
//! channel it selects on, never by aborting it, so sockets are only released
//! after their task has let go of them.
//!
//! ### Shared Slot Table
//! The slot table is the only state written by more than one task. It sits
//! behind an `RwLock` that is never held across socket I/O.
//!
//! ### Two Error Tiers
//! Start-up and background socket failures are fatal: they are reported once
//! through [`ServerHandler::on_fatal_error`] and the server tears itself
//! down. Everything else is returned from the call that failed as a
//! [`ServerError`] and leaves the server usable.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{Server, ServerConfig, ServerHandler};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ServerHandler for Printer {
//!     fn on_data_received(&self, client_id: u32, data: &[u8]) {
//!         println!("{} bytes from client {}", data.len(), client_id);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::init(ServerConfig::default(), Arc::new(Printer)).await?;
//!
//!     server.send_message(b"hello everyone").await?;
//!
//!     server.deinit().await;
//!     Ok(())
//! }
//! ```

mod acceptor;
pub mod config;
pub mod error;
pub mod handler;
pub mod network;
mod responder;
pub mod slots;

pub use config::ServerConfig;
pub use error::{FatalErrorKind, ServerError};
pub use handler::{NoopHandler, ServerHandler};
pub use network::{Server, ServerState};
pub use slots::{ClientId, SlotTable};
