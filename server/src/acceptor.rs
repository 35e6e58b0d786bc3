//! Connection acceptor and the receive task each accepted client gets

use crate::error::FatalErrorKind;
use crate::network::Shared;
use crate::slots::ClientId;
use log::{info, warn};
use shared::{ConnectionLink, LinkReader};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Accepts clients into free slots until listening is switched off
///
/// Stops on its own once every slot is taken, and then also ends
/// advertising since no further client could be served.
pub(crate) async fn run(shared: Arc<Shared>, listener: TcpListener) {
    let mut listening = shared.listening.subscribe();

    info!("Start listening for clients");

    loop {
        if !*listening.borrow() {
            break;
        }

        if shared.slots.read().await.is_full() {
            info!("All slots taken, no longer accepting clients");
            shared.listening.send_replace(false);
            shared.advertising.send_replace(false);
            break;
        }

        let accepted = tokio::select! {
            changed = listening.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            accepted = listener.accept() => accepted,
        };

        let (stream, peer_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                if *listening.borrow() {
                    shared.fatal(FatalErrorKind::Accept, &e);
                }
                break;
            }
        };

        if !*listening.borrow() {
            info!("Dropping connection from {} accepted while stopping", peer_addr);
            break;
        }

        let (link, reader) = match ConnectionLink::open(stream) {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Failed to set up connection from {}: {}", peer_addr, e);
                continue;
            }
        };

        let assigned = shared.slots.write().await.assign(Arc::new(link));
        let (id, generation) = match assigned {
            Ok(assigned) => assigned,
            Err(_) => {
                warn!("No free slot for {}", peer_addr);
                continue;
            }
        };

        info!("Client {} connected from {}", id, peer_addr);
        shared.handler.on_client_connected(id);
        tokio::spawn(serve_client(Arc::clone(&shared), id, generation, reader));
    }

    info!("Stop listening for clients");
}

/// Forwards every read of one client to the handler until the connection ends
async fn serve_client(shared: Arc<Shared>, id: ClientId, generation: u64, mut reader: LinkReader) {
    while let Some(data) = reader.read().await {
        shared.handler.on_data_received(id, data);
    }

    let peer_addr = reader.peer_addr();
    drop(reader);

    // Already gone if the client was removed or the server torn down
    let link = shared.slots.write().await.release(id, generation);
    drop(link);

    info!("Client {} at {} disconnected", id, peer_addr);
    shared.handler.on_client_disconnected(id);
}
