//! Client registry: identities, transports and authentication tokens.
//!
//! The registry is the one piece of state shared between the identity
//! workers (which register new clients), the connection readers (which
//! unregister on disconnect) and the processor (which looks up routes and
//! manages tokens). Every operation is safe to call from any task.
//!
//! # Invariants
//!
//! - A client id is handed out at most once per process
//! - A token exists only for a registered client
//! - Unregistering removes the transport and the token together
//!
//! Locks are always taken in the order transports, then tokens. Neither is
//! held across an `.await`.

use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicI32, Ordering},
    },
};

use relay_proto::{ClientId, SERVER_ID};

use crate::{env::Environment, error::RegistryError};

/// Authentication token issued on login. Carried in the magic-bytes field.
pub type AuthToken = i32;

/// Exclusive upper bound for issued tokens.
pub const DEFAULT_TOKEN_BOUND: u32 = 500_000;

/// Thread-safe map of connected clients and their login tokens.
///
/// Generic over the transport handle `H` so routing logic can be tested
/// without sockets, and over `E` so token draws are reproducible in tests.
#[derive(Debug)]
pub struct ClientRegistry<H, E> {
    next_id: AtomicI32,
    transports: RwLock<HashMap<ClientId, H>>,
    tokens: Mutex<HashMap<ClientId, AuthToken>>,
    token_bound: u32,
    env: E,
}

impl<H, E: Environment> ClientRegistry<H, E> {
    /// Create an empty registry issuing tokens in `[0, DEFAULT_TOKEN_BOUND)`.
    pub fn new(env: E) -> Self {
        Self::with_token_bound(env, DEFAULT_TOKEN_BOUND)
    }

    /// Create an empty registry issuing tokens in `[0, token_bound)`.
    ///
    /// Bounds above `i32::MAX` are clamped so every token fits the wire field.
    pub fn with_token_bound(env: E, token_bound: u32) -> Self {
        Self {
            next_id: AtomicI32::new(SERVER_ID + 1),
            transports: RwLock::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            token_bound: token_bound.min(i32::MAX as u32),
            env,
        }
    }

    /// Hand out the next unused client id.
    ///
    /// Ids start at 1 (0 is the server's own id) and increase by one per
    /// call. They are never reused while the process lives.
    pub fn create_client_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Bind a transport to `client_id`.
    pub fn register(&self, client_id: ClientId, handle: H) -> Result<(), RegistryError> {
        let mut transports = self.write_transports();
        if transports.contains_key(&client_id) {
            return Err(RegistryError::AlreadyRegistered(client_id));
        }
        transports.insert(client_id, handle);
        Ok(())
    }

    /// Check whether `client_id` currently has a transport.
    pub fn is_registered(&self, client_id: ClientId) -> bool {
        self.read_transports().contains_key(&client_id)
    }

    /// Draw a fresh token for `client_id`, replacing any previous one.
    ///
    /// Returns `None` if the client is not registered; tokens are never
    /// stored for ids without a transport.
    pub fn issue_auth_token(&self, client_id: ClientId) -> Option<AuthToken> {
        let transports = self.read_transports();
        if !transports.contains_key(&client_id) {
            return None;
        }

        let token = self.env.random_below(self.token_bound) as AuthToken;
        self.lock_tokens().insert(client_id, token);
        Some(token)
    }

    /// Check a presented token against the one stored for `client_id`.
    ///
    /// False when the client never logged in, has logged out, or presents a
    /// different value.
    pub fn verify(&self, client_id: ClientId, presented: AuthToken) -> bool {
        self.lock_tokens().get(&client_id) == Some(&presented)
    }

    /// Drop the token for `client_id`. Returns whether one existed.
    pub fn revoke(&self, client_id: ClientId) -> bool {
        self.lock_tokens().remove(&client_id).is_some()
    }

    /// Remove the client's transport and token.
    ///
    /// Returns the transport so the caller can close it. Idempotent: a second
    /// call returns `None`.
    pub fn unregister(&self, client_id: ClientId) -> Option<H> {
        let mut transports = self.write_transports();
        let handle = transports.remove(&client_id);
        self.lock_tokens().remove(&client_id);
        handle
    }

    /// Remove every client, returning their transports.
    pub fn drain(&self) -> Vec<(ClientId, H)> {
        let mut transports = self.write_transports();
        self.lock_tokens().clear();
        transports.drain().collect()
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.read_transports().len()
    }

    /// Exclusive upper bound for issued tokens.
    pub fn token_bound(&self) -> u32 {
        self.token_bound
    }

    // A panic while holding a lock cannot leave these maps half-updated, so
    // poisoned guards are used as-is.

    fn read_transports(&self) -> RwLockReadGuard<'_, HashMap<ClientId, H>> {
        self.transports.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_transports(&self) -> RwLockWriteGuard<'_, HashMap<ClientId, H>> {
        self.transports.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tokens(&self) -> MutexGuard<'_, HashMap<ClientId, AuthToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H: Clone, E: Environment> ClientRegistry<H, E> {
    /// Transport bound to `client_id`, if connected.
    pub fn lookup(&self, client_id: ClientId) -> Option<H> {
        self.read_transports().get(&client_id).cloned()
    }
}
