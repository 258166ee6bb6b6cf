//! Accept loop and connection readers.
//!
//! The reactor accepts connections, passes them to the identity pool, and
//! starts one reader task per client once the pool reports it registered.
//! Readers only read: each read becomes a [`RelayEvent::BytesReceived`] on
//! the bounded event queue, so a full queue pauses reading rather than
//! growing memory.

use std::{future::Future, sync::Arc};

use bytes::BytesMut;
use relay_proto::ClientId;
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream, tcp::OwnedReadHalf},
    sync::mpsc,
    task::JoinSet,
};

use crate::{
    driver::RelayEvent,
    env::Environment,
    identity::{IdentityJob, IdentityPool, ReadyClient},
    registry::ClientRegistry,
    transport::ClientTransport,
};

pub(crate) struct Reactor<E> {
    pub(crate) listener: TcpListener,
    pub(crate) registry: Arc<ClientRegistry<ClientTransport, E>>,
    pub(crate) events: mpsc::Sender<RelayEvent>,
    pub(crate) identity: IdentityPool,
    pub(crate) ready: mpsc::Receiver<ReadyClient>,
    pub(crate) read_buffer_size: usize,
}

impl<E: Environment> Reactor<E> {
    /// Serve until `shutdown` completes, then tear everything down.
    ///
    /// On return the listener is closed, every reader has stopped, and every
    /// client transport has been shut down and removed from the registry.
    pub(crate) async fn run(self, shutdown: impl Future<Output = ()>) {
        let Self { listener, registry, events, identity, mut ready, read_buffer_size } = self;
        let mut readers = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!("accepted connection from {}", peer);
                        if let Err(e) = accept(stream, peer, &identity) {
                            tracing::error!("{}", e);
                        }
                    },
                    // Per-connection failures (e.g. reset before accept, fd
                    // exhaustion) leave the listener usable.
                    Err(e) => tracing::warn!("accept error: {}", e),
                },

                Some(client) = ready.recv() => {
                    readers.spawn(read_loop(
                        client.client_id,
                        client.reader,
                        client.transport,
                        Arc::clone(&registry),
                        events.clone(),
                        read_buffer_size,
                    ));
                },

                Some(finished) = readers.join_next(), if !readers.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            tracing::error!("connection reader panicked: {}", e);
                        }
                    }
                },
            }
        }

        tracing::info!("shutting down, closing {} clients", registry.client_count());

        drop(listener);
        identity.shutdown().await;
        readers.shutdown().await;

        for (client_id, transport) in registry.drain() {
            tracing::debug!("closing client {}", client_id);
            transport.close().await;
        }
    }
}

fn accept(
    stream: TcpStream,
    peer: std::net::SocketAddr,
    identity: &IdentityPool,
) -> Result<(), crate::ServerError> {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("set_nodelay for {} failed: {}", peer, e);
    }

    let (reader, writer) = stream.into_split();
    identity.submit(IdentityJob { transport: ClientTransport::new(writer, peer), reader })
}

/// Read until the peer closes, a read fails, or the transport is closed,
/// forwarding every block.
///
/// A block is only read once the previous one has been queued, so a full
/// event queue leaves further bytes in the socket.
async fn read_loop<E: Environment>(
    client_id: ClientId,
    mut reader: OwnedReadHalf,
    transport: ClientTransport,
    registry: Arc<ClientRegistry<ClientTransport, E>>,
    events: mpsc::Sender<RelayEvent>,
    read_buffer_size: usize,
) {
    let closed = transport.closed();
    tokio::pin!(closed);
    let mut buffer = BytesMut::with_capacity(read_buffer_size);

    loop {
        buffer.reserve(read_buffer_size);

        let read = tokio::select! {
            biased;

            () = &mut closed => {
                tracing::debug!("client {} closed by server, reader stopping", client_id);
                break;
            },

            read = reader.read_buf(&mut buffer) => read,
        };

        match read {
            Ok(0) => {
                tracing::debug!("client {} closed the connection", client_id);
                break;
            },
            Ok(_) => {
                let event = RelayEvent::BytesReceived { client_id, block: buffer.split().freeze() };

                tokio::select! {
                    biased;

                    () = &mut closed => break,

                    sent = events.send(event) => {
                        if sent.is_err() {
                            // Processor is gone; the server is stopping
                            return;
                        }
                    },
                }
            },
            Err(e) => {
                tracing::debug!("read from client {} failed: {}", client_id, e);
                break;
            },
        }
    }

    registry.unregister(client_id);
    if !transport.is_closed() {
        transport.close().await;
    }

    // Best effort: a closed queue means the processor already stopped
    let _ = events.send(RelayEvent::ClientDisconnected { client_id }).await;
}
