//! Relay chat server.
//!
//! Clients connect over TCP, receive a numeric id, log in for a token, and
//! exchange `DATA` packets addressed by id. The server routes; it never
//! stores messages.
//!
//! # Architecture
//!
//! The [`RelayDriver`] holds all routing logic and performs no I/O.
//! [`Server`] wires it to Tokio:
//!
//! - an accept loop with one reader task per client, feeding a bounded event
//!   queue
//! - a pool of identity workers that welcome new clients with their id
//! - a single processor task that drains the queue through the driver and
//!   writes the resulting packets
//!
//! # Components
//!
//! - [`RelayDriver`]: Action-based routing logic (pure logic, no I/O)
//! - [`ClientRegistry`]: Shared ids, transports and tokens
//! - [`Server`]: Production runtime that executes driver actions
//! - [`SystemEnv`]: Production environment (crypto RNG)

#![forbid(unsafe_code)]

mod driver;
mod env;
mod error;
mod identity;
mod processor;
mod reactor;
mod registry;
mod system_env;
mod transport;

use std::{future::Future, net::SocketAddr, sync::Arc};

pub use driver::{LogLevel, RelayAction, RelayDriver, RelayEvent};
pub use env::Environment;
pub use error::{RegistryError, ServerError};
pub use registry::{AuthToken, ClientRegistry, DEFAULT_TOKEN_BOUND};
pub use system_env::SystemEnv;
use tokio::{net::TcpListener, sync::mpsc};
pub use transport::ClientTransport;

use crate::{identity::IdentityPool, processor::Processor, reactor::Reactor};

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 9000;

/// Capacity of the channel carrying registered clients back to the reactor.
const READY_QUEUE_CAPACITY: usize = 64;

/// Registry type used by the production server.
pub type ServerRegistry = ClientRegistry<ClientTransport, SystemEnv>;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:9000")
    pub bind_address: String,
    /// Number of identity workers welcoming new connections
    pub identity_workers: usize,
    /// Capacity of the event queue between readers and the processor
    pub queue_capacity: usize,
    /// Bytes requested from the socket per read
    pub read_buffer_size: usize,
    /// Exclusive upper bound for issued tokens
    pub token_bound: u32,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            identity_workers: 1,
            queue_capacity: 1024,
            read_buffer_size: 64 * 1024,
            token_bound: DEFAULT_TOKEN_BOUND,
        }
    }
}

impl ServerRuntimeConfig {
    /// Reject settings the runtime cannot start with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.identity_workers == 0 {
            return Err(ServerError::Config("identity_workers must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ServerError::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.read_buffer_size == 0 {
            return Err(ServerError::Config("read_buffer_size must be at least 1".to_string()));
        }
        if self.token_bound == 0 {
            return Err(ServerError::Config("token_bound must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Production relay server.
///
/// Bound on construction; serves on [`run`](Self::run) or
/// [`run_until`](Self::run_until).
pub struct Server {
    listener: TcpListener,
    registry: Arc<ServerRegistry>,
    config: ServerRuntimeConfig,
}

impl Server {
    /// Validate `config` and bind the listening socket.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        let registry =
            Arc::new(ClientRegistry::with_token_bound(SystemEnv::new(), config.token_bound));

        Ok(Self { listener, registry, config })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared client registry.
    pub fn registry(&self) -> Arc<ServerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` completes.
    ///
    /// On return the listener is closed, every client connection has been
    /// shut down, and all queued events have been processed.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        let Self { listener, registry, config } = self;
        tracing::info!("relay server listening on {}", listener.local_addr()?);

        let (events_tx, events_rx) = mpsc::channel(config.queue_capacity);
        let (ready_tx, ready_rx) = mpsc::channel(READY_QUEUE_CAPACITY);

        let processor = tokio::spawn(Processor::new(Arc::clone(&registry), events_rx).run());
        let identity =
            IdentityPool::spawn(config.identity_workers, Arc::clone(&registry), ready_tx);

        let reactor = Reactor {
            listener,
            registry,
            events: events_tx,
            identity,
            ready: ready_rx,
            read_buffer_size: config.read_buffer_size,
        };
        reactor.run(shutdown).await;

        processor
            .await
            .map_err(|e| ServerError::Internal(format!("processor task failed: {e}")))?;

        tracing::info!("relay server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("client_count", &self.registry.client_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ServerRuntimeConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address, "0.0.0.0:9000");
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let config = ServerRuntimeConfig { queue_capacity: 0, ..Default::default() };

        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = ServerRuntimeConfig { identity_workers: 0, ..Default::default() };

        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn bind_rejects_malformed_address() {
        let config = ServerRuntimeConfig {
            bind_address: "not an address".to_string(),
            ..Default::default()
        };

        assert!(matches!(Server::bind(config).await, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn bind_to_ephemeral_port() {
        let config =
            ServerRuntimeConfig { bind_address: "127.0.0.1:0".to_string(), ..Default::default() };

        let server = Server::bind(config).await.unwrap();

        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert_eq!(server.registry().client_count(), 0);
    }

    #[tokio::test]
    async fn bind_fails_when_port_taken() {
        let config =
            ServerRuntimeConfig { bind_address: "127.0.0.1:0".to_string(), ..Default::default() };
        let first = Server::bind(config).await.unwrap();
        let taken = first.local_addr().unwrap();

        let second = Server::bind(ServerRuntimeConfig {
            bind_address: taken.to_string(),
            ..Default::default()
        })
        .await;

        assert!(matches!(second, Err(ServerError::Transport(_))));
    }
}
