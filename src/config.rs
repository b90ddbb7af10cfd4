use std::time::Duration;

use tinyvec::ArrayVec;

use crate::crypto::DTLS_AEAD_OVERHEAD;
use crate::message::{CipherSuite, DTLSRecord, Header};
use crate::window::MIN_WINDOW_SIZE;
use crate::Error;

/// DTLS configuration
#[derive(Debug, Clone)]
pub struct Config {
    mtu: usize,
    max_queue_rx: usize,
    max_queue_tx: usize,
    replay_window: u64,
    flight_start_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    cipher_suites: ArrayVec<[CipherSuite; 4]>,
    rng_seed: Option<u64>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            mtu: 1150,
            max_queue_rx: 30,
            max_queue_tx: 10,
            replay_window: 64,
            flight_start_rto: Duration::from_secs(1),
            flight_retries: 4,
            handshake_timeout: Duration::from_secs(40),
            cipher_suites: CipherSuite::all(),
            rng_seed: None,
        }
    }

    /// Max transmission unit.
    ///
    /// The largest size UDP packets we will produce.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Max amount of held back incoming items.
    ///
    /// Bounds both out-of-order handshake fragments and records of the
    /// next epoch that arrive ahead of the ChangeCipherSpec.
    #[inline(always)]
    pub fn max_queue_rx(&self) -> usize {
        self.max_queue_rx
    }

    /// Max amount of outgoing packets to buffer.
    #[inline(always)]
    pub fn max_queue_tx(&self) -> usize {
        self.max_queue_tx
    }

    /// Size of the anti-replay sliding window.
    #[inline(always)]
    pub fn replay_window(&self) -> u64 {
        self.replay_window
    }

    /// Time of first retry.
    ///
    /// Every flight restarts with this value.
    /// Doubled for every retry with a ±25% jitter.
    #[inline(always)]
    pub fn flight_start_rto(&self) -> Duration {
        self.flight_start_rto
    }

    /// Max number of retries per flight.
    #[inline(always)]
    pub fn flight_retries(&self) -> usize {
        self.flight_retries
    }

    /// Timeout for the entire handshake, regardless of flights.
    #[inline(always)]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Cipher suites, in order of preference.
    ///
    /// A client offers these, a server accepts these.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    /// Seed for the random generator used for randoms, jitter and ephemeral keys.
    ///
    /// `None` means the thread-local generator.
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }
}

/// Builder for DTLS configuration.
pub struct ConfigBuilder {
    mtu: usize,
    max_queue_rx: usize,
    max_queue_tx: usize,
    replay_window: u64,
    flight_start_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    cipher_suites: ArrayVec<[CipherSuite; 4]>,
    rng_seed: Option<u64>,
}

impl ConfigBuilder {
    /// Set the max transmission unit (MTU).
    ///
    /// The largest size UDP packets we will produce.
    /// Defaults to 1150.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the max amount of held back incoming items.
    ///
    /// Defaults to 30.
    pub fn max_queue_rx(mut self, max_queue_rx: usize) -> Self {
        self.max_queue_rx = max_queue_rx;
        self
    }

    /// Set the max amount of outgoing packets to buffer.
    ///
    /// Defaults to 10.
    pub fn max_queue_tx(mut self, max_queue_tx: usize) -> Self {
        self.max_queue_tx = max_queue_tx;
        self
    }

    /// Set the size of the anti-replay window.
    ///
    /// Must be at least 32.
    /// Defaults to 64.
    pub fn replay_window(mut self, size: u64) -> Self {
        self.replay_window = size;
        self
    }

    /// Set the time of first retry.
    ///
    /// Every flight restarts with this value.
    /// Doubled for every retry with a ±25% jitter.
    /// Defaults to 1 second.
    pub fn flight_start_rto(mut self, rto: Duration) -> Self {
        self.flight_start_rto = rto;
        self
    }

    /// Set the max number of retries per flight.
    ///
    /// Defaults to 4.
    pub fn flight_retries(mut self, retries: usize) -> Self {
        self.flight_retries = retries;
        self
    }

    /// Set the timeout for the entire handshake, regardless of flights.
    ///
    /// Defaults to 40 seconds.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the cipher suites, in order of preference.
    ///
    /// Unknown suites are ignored.
    /// Defaults to all supported suites.
    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites.clear();
        for suite in suites {
            if suite.is_supported() && !self.cipher_suites.contains(suite) {
                self.cipher_suites.push(*suite);
            }
        }
        self
    }

    /// Seed the random generator for deterministic runs.
    ///
    /// Only meant for tests.
    /// Defaults to `None`.
    pub fn rng_seed(mut self, seed: Option<u64>) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::Configuration` for a replay window below 32, an empty
    /// cipher suite list, or an MTU too small to carry a single handshake byte.
    pub fn build(self) -> Result<Config, Error> {
        if self.replay_window < MIN_WINDOW_SIZE {
            return Err(Error::Configuration(format!(
                "replay window must be at least {}, got {}",
                MIN_WINDOW_SIZE, self.replay_window
            )));
        }

        if self.cipher_suites.is_empty() {
            return Err(Error::Configuration("no cipher suites".to_string()));
        }

        let min_mtu = DTLSRecord::HEADER_LEN + Header::LEN + DTLS_AEAD_OVERHEAD + 1;
        if self.mtu < min_mtu {
            return Err(Error::Configuration(format!(
                "mtu must be at least {}, got {}",
                min_mtu, self.mtu
            )));
        }

        if self.max_queue_tx == 0 {
            return Err(Error::Configuration(
                "max_queue_tx must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            mtu: self.mtu,
            max_queue_rx: self.max_queue_rx,
            max_queue_tx: self.max_queue_tx,
            replay_window: self.replay_window,
            flight_start_rto: self.flight_start_rto,
            flight_retries: self.flight_retries,
            handshake_timeout: self.handshake_timeout,
            cipher_suites: self.cipher_suites,
            rng_seed: self.rng_seed,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mtu: 1150,
            max_queue_rx: 30,
            max_queue_tx: 10,
            replay_window: 64,
            flight_start_rto: Duration::from_secs(1),
            flight_retries: 4,
            handshake_timeout: Duration::from_secs(40),
            cipher_suites: CipherSuite::all(),
            rng_seed: None,
        }
    }
}
