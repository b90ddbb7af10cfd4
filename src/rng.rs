//! Seedable random number generator for deterministic testing.
//!
//! When a seed is provided via [`Config::rng_seed`](crate::Config::rng_seed), handshake
//! randoms, retransmit jitter and ephemeral keys are deterministic. This is useful for
//! testing and debugging.

use rand::distributions::{Distribution, Standard};
use rand::rngs::{StdRng, ThreadRng};
use rand::{CryptoRng, Rng, RngCore, SeedableRng};

/// A random number generator that can be seeded for deterministic behavior.
///
/// When created with a seed, it produces deterministic random values.
/// When created without a seed, it uses the thread-local random generator.
pub struct SeededRng {
    inner: Inner,
}

enum Inner {
    Seeded(StdRng),
    Thread(ThreadRng),
}

impl SeededRng {
    /// Create a new RNG with an optional seed.
    pub fn new(seed: Option<u64>) -> Self {
        let inner = match seed {
            Some(seed) => Inner::Seeded(StdRng::seed_from_u64(seed)),
            None => Inner::Thread(rand::thread_rng()),
        };
        Self { inner }
    }

    /// Generate a random value of type T.
    pub fn random<T>(&mut self) -> T
    where
        Standard: Distribution<T>,
    {
        match &mut self.inner {
            Inner::Seeded(rng) => rng.gen(),
            Inner::Thread(rng) => rng.gen(),
        }
    }
}

impl RngCore for SeededRng {
    fn next_u32(&mut self) -> u32 {
        match &mut self.inner {
            Inner::Seeded(rng) => rng.next_u32(),
            Inner::Thread(rng) => rng.next_u32(),
        }
    }

    fn next_u64(&mut self) -> u64 {
        match &mut self.inner {
            Inner::Seeded(rng) => rng.next_u64(),
            Inner::Thread(rng) => rng.next_u64(),
        }
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        match &mut self.inner {
            Inner::Seeded(rng) => rng.fill_bytes(dest),
            Inner::Thread(rng) => rng.fill_bytes(dest),
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        match &mut self.inner {
            Inner::Seeded(rng) => rng.try_fill_bytes(dest),
            Inner::Thread(rng) => rng.try_fill_bytes(dest),
        }
    }
}

// Both StdRng and ThreadRng are cryptographically secure generators.
impl CryptoRng for SeededRng {}

impl std::fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let is_seeded = matches!(self.inner, Inner::Seeded(_));
        f.debug_struct("SeededRng")
            .field("seeded", &is_seeded)
            .finish()
    }
}
