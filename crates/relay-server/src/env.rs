//! Environment abstraction for deterministic testing.
//!
//! Decouples token generation from the operating system's entropy source so
//! tests can run with a seeded RNG and production can use real randomness.

/// Source of randomness used by the registry.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u32`.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    /// Generates a uniformly distributed value in `[0, bound)`.
    ///
    /// Uses rejection sampling: draws below `2^32 mod bound` are discarded so
    /// every result is equally likely. Returns 0 when `bound` is 0 or 1.
    fn random_below(&self, bound: u32) -> u32 {
        if bound <= 1 {
            return 0;
        }

        let threshold = bound.wrapping_neg() % bound;
        loop {
            let value = self.random_u32();
            if value >= threshold {
                return value % bound;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[derive(Clone)]
    struct SeededEnv(Arc<Mutex<ChaCha8Rng>>);

    impl Environment for SeededEnv {
        fn random_bytes(&self, buffer: &mut [u8]) {
            self.0.lock().unwrap().fill_bytes(buffer);
        }
    }

    fn seeded(seed: u64) -> SeededEnv {
        SeededEnv(Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))))
    }

    #[derive(Clone)]
    struct FixedEnv(u32);

    impl Environment for FixedEnv {
        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.copy_from_slice(&self.0.to_be_bytes()[..buffer.len()]);
        }
    }

    #[test]
    fn random_below_stays_in_range() {
        let env = seeded(1);
        for _ in 0..10_000 {
            assert!(env.random_below(500_000) < 500_000);
        }
    }

    #[test]
    fn random_below_is_deterministic_for_a_seed() {
        let (a, b) = (seeded(42), seeded(42));

        let first: Vec<u32> = (0..16).map(|_| a.random_below(1000)).collect();
        let second: Vec<u32> = (0..16).map(|_| b.random_below(1000)).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn random_below_degenerate_bounds() {
        let env = FixedEnv(u32::MAX);
        assert_eq!(env.random_below(0), 0);
        assert_eq!(env.random_below(1), 0);
    }

    #[test]
    fn random_below_accepts_values_above_threshold() {
        // 2^32 mod 3 == 1, so only a draw of 0 is rejected.
        assert_eq!(FixedEnv(7).random_below(3), 1);
        assert_eq!(FixedEnv(u32::MAX).random_below(3), 0);
    }
}
