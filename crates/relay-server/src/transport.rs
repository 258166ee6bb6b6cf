//! TCP transport for one connected client.
//!
//! Reads and writes are split: the read half belongs to the connection's
//! reader task, the write half lives here behind an async mutex so the
//! identity workers and the processor can both send to the client without
//! interleaving bytes of different packets.
//!
//! Closing is signalled before the write lock is taken. A write stalled on a
//! peer that stopped reading observes the signal, gives up the lock and
//! fails, so `close` never waits behind it. The connection's reader watches
//! the same signal and stops.

use std::{future::Future, net::SocketAddr, sync::Arc};

use relay_proto::Packet;
use tokio::{
    io::AsyncWriteExt,
    net::tcp::OwnedWriteHalf,
    sync::{Mutex, watch},
};

use crate::error::ServerError;

/// Write side of a client connection.
///
/// Cheap to clone; clones share the same socket and the same closed state.
#[derive(Debug, Clone)]
pub struct ClientTransport {
    peer: SocketAddr,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    closed: Arc<watch::Sender<bool>>,
}

impl ClientTransport {
    /// Wrap the write half of an accepted stream.
    pub fn new(writer: OwnedWriteHalf, peer: SocketAddr) -> Self {
        Self {
            peer,
            writer: Arc::new(Mutex::new(writer)),
            closed: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Remote address of the client.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether [`close`](Self::close) has been called on any clone.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Completes once the transport is closed.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut state = self.closed.subscribe();
        async move {
            // The sender lives as long as any clone; an error means all are gone
            let _ = state.wait_for(|closed| *closed).await;
        }
    }

    /// Encode `packet` and write all of it.
    ///
    /// Packets sent through clones of one transport never interleave. Fails
    /// with `ServerError::Transport` if the transport is, or becomes, closed
    /// before the write finishes; the peer may then hold a partial frame.
    pub async fn send(&self, packet: &Packet) -> Result<(), ServerError> {
        let bytes = packet.to_bytes()?;
        let closed = self.closed();

        tokio::select! {
            biased;

            () = closed => Err(ServerError::Transport(format!("{} is closed", self.peer))),

            written = async {
                let mut writer = self.writer.lock().await;
                writer.write_all(&bytes).await
            } => Ok(written?),
        }
    }

    /// Mark the transport closed and shut down the write side. The peer sees
    /// end-of-stream.
    ///
    /// Errors are ignored: the connection is being discarded either way.
    pub async fn close(&self) {
        self.closed.send_replace(true);

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!("shutdown of {} failed: {}", self.peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use relay_proto::MessageType;
    use tokio::{
        io::AsyncReadExt,
        net::{TcpListener, TcpStream},
        time::timeout,
    };

    use super::*;

    /// Transport on the server side of a loopback connection, plus the peer.
    async fn connected() -> (ClientTransport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, addr) = listener.accept().await.unwrap();
        let (_reader, writer) = stream.into_split();
        (ClientTransport::new(writer, addr), peer)
    }

    fn large_packet() -> Packet {
        Packet::new(0, MessageType::Data, 1, 2, Bytes::from(vec![b'x'; 1 << 20]))
    }

    #[tokio::test]
    async fn send_writes_whole_frame() {
        let (transport, mut peer) = connected().await;
        let packet = Packet::new(3, MessageType::Data, 1, 2, Bytes::from_static(b"hi"));

        transport.send(&packet).await.unwrap();

        let mut frame = vec![0u8; packet.encoded_len()];
        peer.read_exact(&mut frame).await.unwrap();
        assert_eq!(Packet::decode(&frame).unwrap(), packet);
    }

    #[tokio::test]
    async fn close_interrupts_write_to_stalled_peer() {
        let (transport, _peer) = connected().await;
        let sender = transport.clone();

        // The peer never reads, so the socket buffers fill and a write parks
        let writes = tokio::spawn(async move {
            let packet = large_packet();
            for _ in 0..64 {
                sender.send(&packet).await?;
            }
            Ok::<(), ServerError>(())
        });
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!writes.is_finished(), "writes should be stalled on the peer");

        timeout(Duration::from_secs(2), transport.close())
            .await
            .expect("close waited behind a stalled write");

        let result = timeout(Duration::from_secs(2), writes).await.unwrap().unwrap();
        assert!(matches!(result, Err(ServerError::Transport(_))));
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (transport, _peer) = connected().await;

        transport.close().await;

        assert!(transport.is_closed());
        let packet = Packet::new(0, MessageType::Login, 1, 0, Bytes::new());
        assert!(matches!(transport.send(&packet).await, Err(ServerError::Transport(_))));
    }

    #[tokio::test]
    async fn closed_resolves_for_every_clone() {
        let (transport, mut peer) = connected().await;
        let watcher = transport.clone().closed();

        transport.close().await;

        timeout(Duration::from_secs(1), watcher).await.unwrap();
        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
