//! Discovery responder: answers `Marco` with the prepared `Polo` datagram

use crate::config::ServerConfig;
use crate::error::{FatalErrorKind, ServerError};
use crate::network::Shared;
use log::{debug, info};
use shared::is_discovery_request;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// How long one receive may block before the advertising flag is re-read
const ADVERTISE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longer than any valid request, so oversized datagrams never compare equal
const REQUEST_BUFFER_SIZE: usize = 64;

/// Binds the discovery port on all interfaces and joins the multicast group
pub(crate) fn bind_advertise_socket(config: &ServerConfig) -> Result<UdpSocket, ServerError> {
    let bind_error = ServerError::startup(FatalErrorKind::AdvertiseBind);

    let socket = match Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)) {
        Ok(socket) => socket,
        Err(e) => return Err(bind_error(e)),
    };

    let bind_address = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.advertise_port);
    info!("Binding advertise socket at {}", bind_address);
    if let Err(e) = socket
        .set_reuse_address(true)
        .and_then(|()| socket.bind(&bind_address.into()))
    {
        return Err(bind_error(e));
    }

    info!(
        "Joining multicast group {} on interface {}",
        config.multicast_address, config.multicast_interface
    );
    socket
        .join_multicast_v4(&config.multicast_address, &config.multicast_interface)
        .map_err(ServerError::startup(FatalErrorKind::MulticastJoin))?;

    socket
        .set_nonblocking(true)
        .and_then(|()| UdpSocket::from_std(socket.into()))
        .map_err(ServerError::startup(FatalErrorKind::AdvertiseBind))
}

/// Answers discovery requests until advertising is switched off
///
/// Any socket failure while still advertising is fatal for the server. A
/// failure after advertising was switched off is the expected way out.
pub(crate) async fn run(shared: Arc<Shared>, socket: UdpSocket) {
    let mut advertising = shared.advertising.subscribe();
    let mut buffer = [0u8; REQUEST_BUFFER_SIZE];

    info!("Start advertising {:?}", shared.descriptor.name());

    loop {
        if !*advertising.borrow() {
            break;
        }

        let received = tokio::select! {
            changed = advertising.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            received = timeout(ADVERTISE_POLL_INTERVAL, socket.recv_from(&mut buffer)) => received,
        };

        let (len, requester) = match received {
            Err(_) => continue,
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                if *advertising.borrow() {
                    shared.fatal(FatalErrorKind::AdvertiseReceive, &e);
                }
                break;
            }
        };

        if !is_discovery_request(&buffer[..len]) {
            debug!("Ignoring {} byte datagram from {}", len, requester);
            continue;
        }
        if !*advertising.borrow() {
            break;
        }

        debug!("Discovery request from {}", requester);
        if let Err(e) = socket.send_to(&shared.advertisement, requester).await {
            if *advertising.borrow() {
                shared.fatal(FatalErrorKind::AdvertiseSend, &e);
            }
            break;
        }
    }

    info!("Stop advertising");
}
