//! Randomness capability.
//!
//! Primitives never reach for a process-wide RNG. Every constructor that
//! needs entropy takes a [`RandomSource`], so production code plugs in
//! [`OsRandom`] and tests plug in a seeded generator.

use crate::error::{Result, ShieldError};

/// Source of cryptographically secure random bytes.
///
/// # Invariants
///
/// - Production implementations MUST be backed by a CSPRNG
/// - Two calls never return the same bytes except by chance
/// - Implementations are shared across threads and take `&self`
pub trait RandomSource: Send + Sync {
    /// Fills the provided buffer with random bytes.
    fn fill_bytes(&self, buffer: &mut [u8]) -> Result<()>;

    /// Returns a fixed-size array of random bytes.
    fn random_array<const N: usize>(&self) -> Result<[u8; N]>
    where
        Self: Sized,
    {
        let mut bytes = [0u8; N];
        self.fill_bytes(&mut bytes)?;
        Ok(bytes)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &R {
    fn fill_bytes(&self, buffer: &mut [u8]) -> Result<()> {
        (**self).fill_bytes(buffer)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for std::sync::Arc<R> {
    fn fill_bytes(&self, buffer: &mut [u8]) -> Result<()> {
        (**self).fill_bytes(buffer)
    }
}

/// Operating system CSPRNG (getrandom).
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, buffer: &mut [u8]) -> Result<()> {
        getrandom::fill(buffer).map_err(|e| {
            tracing::error!(error = %e, "OS random source failed");
            ShieldError::RandomnessUnavailable
        })
    }
}

/// Deterministic ChaCha20 generator for reproducible tests.
///
/// Never use outside tests: the whole output stream follows from the seed.
#[cfg(any(test, feature = "test-utils"))]
pub struct SeededRandom {
    rng: parking_lot::Mutex<rand_chacha::ChaCha20Rng>,
}

#[cfg(any(test, feature = "test-utils"))]
impl SeededRandom {
    /// Create a generator from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        Self { rng: parking_lot::Mutex::new(rand_chacha::ChaCha20Rng::seed_from_u64(seed)) }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl RandomSource for SeededRandom {
    fn fill_bytes(&self, buffer: &mut [u8]) -> Result<()> {
        use rand::RngCore;
        self.rng.lock().fill_bytes(buffer);
        Ok(())
    }
}
