//! Duplex byte-stream wrapper around one connected TCP socket
//!
//! A [`ConnectionLink`] is split in two when it is opened. The link itself
//! keeps the write side and the shutdown signal; the [`LinkReader`] is moved
//! into the task that loops on reads. Stopping a connection is always done
//! in two steps:
//!
//! 1. [`ConnectionLink::shutdown`] publishes the shutdown, which makes a
//!    reader parked in [`LinkReader::read`] return `None` and a parked
//!    [`ConnectionLink::send`] fail.
//! 2. Dropping the link closes the write side. The socket itself is released
//!    once the reader has also been dropped, i.e. after its task observed the
//!    shutdown.
//!
//! Dropping the link without calling `shutdown` first is also safe: the
//! reader sees the signal go away and stops just the same.

use log::debug;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

/// Size of the buffer a single read fills
pub const READ_BUFFER_SIZE: usize = 1024;

/// Anything a slot or session owns that can be told to stop its reader
pub trait Link: Send + Sync {
    /// Unblocks the task reading from this link. Must be idempotent.
    fn shutdown(&self);
}

impl<L: Link + ?Sized> Link for Arc<L> {
    fn shutdown(&self) {
        (**self).shutdown()
    }
}

fn shut_down_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection link is shut down")
}

/// Write side and shutdown control of one connection
pub struct ConnectionLink {
    peer_addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    shutdown: watch::Sender<bool>,
}

/// Read side of one connection, owned by its receive task
pub struct LinkReader {
    peer_addr: SocketAddr,
    reader: OwnedReadHalf,
    shutdown: watch::Receiver<bool>,
    buffer: Box<[u8]>,
}

impl ConnectionLink {
    /// Takes ownership of a connected stream and splits it
    pub fn open(stream: TcpStream) -> io::Result<(Self, LinkReader)> {
        let peer_addr = stream.peer_addr()?;
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let link = ConnectionLink {
            peer_addr,
            writer: Mutex::new(writer),
            shutdown,
        };
        let reader = LinkReader {
            peer_addr,
            reader,
            shutdown: shutdown_rx,
            buffer: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
        };

        Ok((link, reader))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Writes all of `data` to the peer
    ///
    /// Fails with `NotConnected` once the link has been shut down, including
    /// while this write is waiting on a peer that stopped reading. A write
    /// cut short that way may leave part of `data` on the wire.
    pub async fn send(&self, data: &[u8]) -> io::Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(shut_down_error());
        }

        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(data).await?;
            writer.flush().await
        };

        tokio::select! {
            result = write => result,
            // Only ever flips to true; the sender lives as long as `self`
            _ = shutdown.changed() => {
                debug!("Write to {} interrupted by shutdown", self.peer_addr);
                Err(shut_down_error())
            }
        }
    }

    /// Unblocks the reader and any pending send. Calling it again has no
    /// further effect.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            debug!("Shutting down link to {}", self.peer_addr);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl Link for ConnectionLink {
    fn shutdown(&self) {
        ConnectionLink::shutdown(self)
    }
}

impl LinkReader {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Waits for the next chunk of bytes from the peer
    ///
    /// The returned slice is exactly what one read produced; it does not line
    /// up with any message the peer meant to send. `None` means the peer
    /// closed the stream, the read failed, or the link was shut down or
    /// dropped. All of these end the connection.
    pub async fn read(&mut self) -> Option<&[u8]> {
        if *self.shutdown.borrow() {
            return None;
        }

        let len = tokio::select! {
            // The value only ever flips to true, and an error means the link
            // was dropped: either way the connection is over.
            _ = self.shutdown.changed() => return None,
            result = self.reader.read(&mut self.buffer) => match result {
                Ok(0) => return None,
                Ok(len) => len,
                Err(e) => {
                    debug!("Read from {} failed: {}", self.peer_addr, e);
                    return None;
                }
            },
        };

        Some(&self.buffer[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    async fn connected_pair() -> ((ConnectionLink, LinkReader), (ConnectionLink, LinkReader)) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let local = ConnectionLink::open(connected.unwrap()).unwrap();
        let remote = ConnectionLink::open(accepted.unwrap().0).unwrap();
        (local, remote)
    }

    #[tokio::test]
    async fn test_bytes_arrive_verbatim() {
        let ((local, _local_reader), (_remote, mut remote_reader)) = connected_pair().await;

        tokio_test::assert_ok!(local.send(b"ping").await);

        let data = remote_reader.read().await.unwrap();
        assert_eq!(data, b"ping");
    }

    #[tokio::test]
    async fn test_shutdown_unblocks_parked_reader() {
        let ((local, mut local_reader), (_remote, _remote_reader)) = connected_pair().await;

        let reader_task = tokio::spawn(async move { local_reader.read().await.is_none() });
        tokio::time::sleep(Duration::from_millis(20)).await;

        local.shutdown();
        local.shutdown();

        let stopped = timeout(Duration::from_secs(1), reader_task)
            .await
            .expect("reader did not observe the shutdown")
            .unwrap();
        assert!(stopped);
        assert!(local.is_shut_down());
    }

    #[tokio::test]
    async fn test_dropped_link_stops_reader() {
        let ((local, mut local_reader), _remote) = connected_pair().await;

        drop(local);

        let result = timeout(Duration::from_secs(1), local_reader.read()).await;
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_peer_close_ends_reads() {
        let ((_local, mut local_reader), remote) = connected_pair().await;

        drop(remote);

        let result = timeout(Duration::from_secs(1), local_reader.read()).await;
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_stalled_send() {
        // The remote side never reads, so a large write fills both buffers
        let ((local, _local_reader), (_remote, _remote_reader)) = connected_pair().await;
        let local = Arc::new(local);

        let sender = Arc::clone(&local);
        let send_task = tokio::spawn(async move {
            let payload = vec![0u8; 64 * 1024 * 1024];
            sender.send(&payload).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!send_task.is_finished());

        local.shutdown();

        let result = timeout(Duration::from_secs(1), send_task)
            .await
            .expect("stalled send was not interrupted")
            .unwrap();
        let error = tokio_test::assert_err!(result);
        assert_eq!(error.kind(), io::ErrorKind::NotConnected);
        assert_eq!(Arc::strong_count(&local), 1);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let ((local, _local_reader), _remote) = connected_pair().await;

        local.shutdown();

        let error = tokio_test::assert_err!(local.send(b"late").await);
        assert_eq!(error.kind(), io::ErrorKind::NotConnected);
    }
}
