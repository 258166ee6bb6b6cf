//! Identity workers.
//!
//! Every accepted connection is handed to this pool. A worker allocates the
//! client id, writes the `GENERATED_ID` welcome packet, registers the
//! transport and then hands the read half and the transport to the reactor,
//! which starts reading only once the client is routable. Writing the welcome
//! packet here keeps a slow client from stalling the accept loop.

use std::sync::Arc;

use relay_proto::{ClientId, Packet};
use tokio::{
    net::tcp::OwnedReadHalf,
    sync::{Mutex, mpsc},
    task::JoinSet,
};

use crate::{
    env::Environment, error::ServerError, registry::ClientRegistry, transport::ClientTransport,
};

/// A freshly accepted connection awaiting an identity.
#[derive(Debug)]
pub(crate) struct IdentityJob {
    pub(crate) transport: ClientTransport,
    pub(crate) reader: OwnedReadHalf,
}

/// A registered client whose reads may now begin.
#[derive(Debug)]
pub(crate) struct ReadyClient {
    pub(crate) client_id: ClientId,
    pub(crate) reader: OwnedReadHalf,
    pub(crate) transport: ClientTransport,
}

/// Fixed-size pool of long-lived identity workers.
#[derive(Debug)]
pub(crate) struct IdentityPool {
    jobs: mpsc::UnboundedSender<IdentityJob>,
    workers: JoinSet<()>,
}

impl IdentityPool {
    /// Start `workers` workers (at least one).
    pub(crate) fn spawn<E: Environment>(
        workers: usize,
        registry: Arc<ClientRegistry<ClientTransport, E>>,
        ready: mpsc::Sender<ReadyClient>,
    ) -> Self {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut set = JoinSet::new();
        for worker in 0..workers.max(1) {
            set.spawn(worker_loop(
                worker,
                Arc::clone(&receiver),
                Arc::clone(&registry),
                ready.clone(),
            ));
        }

        Self { jobs, workers: set }
    }

    /// Queue a connection for identity assignment. Never blocks.
    pub(crate) fn submit(&self, job: IdentityJob) -> Result<(), ServerError> {
        self.jobs
            .send(job)
            .map_err(|_| ServerError::Internal("identity workers have stopped".to_string()))
    }

    /// Stop all workers. Jobs still queued are dropped with their sockets.
    pub(crate) async fn shutdown(self) {
        let Self { jobs, mut workers } = self;
        drop(jobs);
        workers.shutdown().await;
    }
}

async fn worker_loop<E: Environment>(
    worker: usize,
    jobs: Arc<Mutex<mpsc::UnboundedReceiver<IdentityJob>>>,
    registry: Arc<ClientRegistry<ClientTransport, E>>,
    ready: mpsc::Sender<ReadyClient>,
) {
    loop {
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else { break };
        assign_identity(job, &registry, &ready).await;
    }

    tracing::debug!("identity worker {} stopped", worker);
}

/// Welcome one connection: id, `GENERATED_ID`, registration, then reads.
pub(crate) async fn assign_identity<E: Environment>(
    job: IdentityJob,
    registry: &ClientRegistry<ClientTransport, E>,
    ready: &mpsc::Sender<ReadyClient>,
) {
    let IdentityJob { transport, reader } = job;
    let client_id = registry.create_client_id();
    let peer = transport.peer_addr();

    if let Err(e) = transport.send(&Packet::generated_id(client_id)).await {
        tracing::warn!("welcome to {} (client {}) failed: {}", peer, client_id, e);
        transport.close().await;
        return;
    }

    if let Err(e) = registry.register(client_id, transport.clone()) {
        tracing::error!("registering {} failed: {}", peer, e);
        transport.close().await;
        return;
    }

    tracing::info!("client {} connected from {}", client_id, peer);

    let client = ReadyClient { client_id, reader, transport };
    if let Err(mpsc::error::SendError(client)) = ready.send(client).await {
        // Reactor is shutting down
        registry.unregister(client_id);
        client.transport.close().await;
    }
}
