//! Shared helpers for relay server integration tests.

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use relay_proto::{ClientId, MessageType, Packet, PacketHeader, SERVER_ID};
use relay_server::{Server, ServerRegistry, ServerRuntimeConfig};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};

/// How long to wait for a packet that should arrive.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding a packet will not arrive.
pub const SILENCE: Duration = Duration::from_millis(300);

/// A running server and the means to stop it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<ServerRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), relay_server::ServerError>>,
}

impl TestServer {
    /// Bind to an ephemeral loopback port and start serving.
    pub async fn start() -> Self {
        Self::start_with(ServerRuntimeConfig::default()).await
    }

    pub async fn start_with(config: ServerRuntimeConfig) -> Self {
        let config = ServerRuntimeConfig { bind_address: "127.0.0.1:0".to_string(), ..config };
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let registry = server.registry();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(server.run_until(async move {
            let _ = rx.await;
        }));

        Self { addr, registry, shutdown: Some(tx), handle }
    }

    /// Stop the server and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        timeout(RECV_TIMEOUT, &mut self.handle)
            .await
            .expect("server did not stop in time")
            .unwrap()
            .unwrap();
    }

    /// Wait until the registry holds exactly `count` clients.
    pub async fn wait_for_clients(&self, count: usize) {
        timeout(RECV_TIMEOUT, async {
            while self.registry.client_count() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client count never reached expected value");
    }
}

/// Minimal blocking-style client speaking the wire protocol.
pub struct TestClient {
    pub id: ClientId,
    pub token: i32,
    stream: TcpStream,
}

impl TestClient {
    /// Connect and consume the `GENERATED_ID` welcome.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = Self { id: SERVER_ID, token: 0, stream };

        let welcome = client.recv().await;
        assert_eq!(welcome.message_type(), MessageType::GeneratedId);
        client.id = welcome.destination_id();
        client
    }

    /// Connect, log in, and remember the token.
    pub async fn connect_and_login(addr: SocketAddr) -> Self {
        let mut client = Self::connect(addr).await;
        client.login().await;
        client
    }

    pub async fn login(&mut self) -> Packet {
        self.send(&Packet::new(0, MessageType::Login, self.id, SERVER_ID, Bytes::new())).await;
        let reply = self.recv().await;
        assert_eq!(reply.message_type(), MessageType::Login);
        self.token = reply.magic_bytes();
        reply
    }

    pub async fn logout(&mut self) -> Packet {
        let request =
            Packet::new(self.token, MessageType::Logout, self.id, SERVER_ID, Bytes::new());
        self.send(&request).await;
        self.recv().await
    }

    /// Send a `DATA` packet with the current token.
    pub async fn send_data(&mut self, to: ClientId, text: &str) -> Packet {
        let packet = Packet::new(
            self.token,
            MessageType::Data,
            self.id,
            to,
            Bytes::copy_from_slice(text.as_bytes()),
        );
        self.send(&packet).await;
        packet
    }

    pub async fn send(&mut self, packet: &Packet) {
        self.send_raw(&packet.to_bytes().unwrap()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Like [`send`](Self::send), but reports a write failure instead of
    /// failing the test.
    pub async fn try_send(&mut self, packet: &Packet) -> std::io::Result<()> {
        self.stream.write_all(&packet.to_bytes().unwrap()).await
    }

    /// Read one packet, failing the test after [`RECV_TIMEOUT`].
    pub async fn recv(&mut self) -> Packet {
        timeout(RECV_TIMEOUT, self.read_packet())
            .await
            .expect("timed out waiting for packet")
            .expect("connection closed while waiting for packet")
    }

    /// Assert nothing arrives for [`SILENCE`].
    pub async fn expect_silence(&mut self) {
        if let Ok(packet) = timeout(SILENCE, self.read_packet()).await {
            panic!("expected no packet, got {packet:?}");
        }
    }

    /// Read until end-of-stream, returning whether it arrived in time.
    pub async fn closed_by_server(&mut self) -> bool {
        let mut sink = Vec::new();
        matches!(timeout(RECV_TIMEOUT, self.stream.read_to_end(&mut sink)).await, Ok(Ok(_)))
    }

    async fn read_packet(&mut self) -> Option<Packet> {
        let mut frame = vec![0u8; PacketHeader::SIZE];
        self.stream.read_exact(&mut frame).await.ok()?;

        let header = PacketHeader::from_bytes(&frame).unwrap();
        let length = usize::try_from(header.message_length()).unwrap();
        frame.resize(PacketHeader::SIZE + length, 0);
        self.stream.read_exact(&mut frame[PacketHeader::SIZE..]).await.ok()?;

        Some(Packet::decode(&frame).unwrap())
    }
}
