//! Event processor.
//!
//! A single task drains the event queue in order, runs each event through
//! the [`RelayDriver`] and executes the resulting actions. Because only this
//! task touches the driver, decoding and routing for all clients is
//! serialized and needs no locking of its own.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    driver::{LogLevel, RelayAction, RelayDriver, RelayEvent},
    env::Environment,
    registry::ClientRegistry,
    transport::ClientTransport,
};

pub(crate) struct Processor<E> {
    driver: RelayDriver<ClientTransport, E>,
    registry: Arc<ClientRegistry<ClientTransport, E>>,
    events: mpsc::Receiver<RelayEvent>,
}

impl<E: Environment> Processor<E> {
    pub(crate) fn new(
        registry: Arc<ClientRegistry<ClientTransport, E>>,
        events: mpsc::Receiver<RelayEvent>,
    ) -> Self {
        Self { driver: RelayDriver::new(Arc::clone(&registry)), registry, events }
    }

    /// Process events until every sender has been dropped.
    pub(crate) async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            let actions = self.driver.process_event(event);
            self.execute_actions(actions).await;
        }

        tracing::debug!("event queue closed, processor stopping");
    }

    async fn execute_actions(&self, actions: Vec<RelayAction>) {
        for action in actions {
            match action {
                RelayAction::SendToClient { client_id, packet } => {
                    let Some(transport) = self.registry.lookup(client_id) else {
                        tracing::debug!("SendToClient: client {} not connected", client_id);
                        continue;
                    };

                    if let Err(e) = transport.send(&packet).await {
                        if transport.is_closed() {
                            tracing::debug!("SendToClient: client {} closed mid-write", client_id);
                            continue;
                        }

                        tracing::warn!("SendToClient write failed for {}: {}", client_id, e);
                        // Closing also stops the client's reader
                        self.registry.unregister(client_id);
                        transport.close().await;
                    }
                },
                RelayAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }
    }
}
