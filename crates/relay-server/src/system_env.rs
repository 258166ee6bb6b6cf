//! Production Environment implementation using the OS RNG.
//!
//! `SystemEnv` draws every byte from getrandom, so tokens issued in
//! production are unpredictable and not reproducible.

use crate::env::Environment;

/// Production environment backed by cryptographic randomness.
///
/// # Security
///
/// getrandom provides OS-level randomness (e.g., /dev/urandom on Linux,
/// `BCryptGenRandom` on Windows). Authentication tokens are drawn from it.
///
/// # Panics
///
/// Panics if the OS RNG fails. A relay that cannot draw tokens cannot
/// authenticate anyone, and RNG failure indicates OS-level breakage.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
