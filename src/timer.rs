use std::time::{Duration, Instant};

use crate::SeededRng;

// In seconds.
const JITTER_RANGE: f32 = 0.5;

const MIN_RTO: Duration = Duration::from_millis(50);

/// Retransmission timeout with doubling and jitter.
#[derive(Debug)]
pub(crate) struct ExponentialBackoff {
    start_rto: Duration,
    retries: usize,
    rto: Duration,
    jitter: f32,
    left: usize,
}

impl ExponentialBackoff {
    pub fn new(start_rto: Duration, retries: usize, rng: &mut SeededRng) -> Self {
        Self {
            start_rto,
            retries,
            rto: start_rto,
            jitter: jitter(rng),
            left: retries,
        }
    }

    pub fn reset(&mut self, rng: &mut SeededRng) {
        self.rto = self.start_rto;
        self.jitter = jitter(rng);
        self.left = self.retries;
    }

    pub fn rto(&self) -> Duration {
        let jitter = Duration::from_secs_f32(self.jitter.abs());
        let rto = if self.jitter < 0.0 {
            self.rto.saturating_sub(jitter)
        } else {
            self.rto + jitter
        };
        rto.max(MIN_RTO)
    }

    /// Consume one retry and double the timeout.
    ///
    /// Returns false when no retries are left.
    pub fn attempt(&mut self, rng: &mut SeededRng) -> bool {
        let Some(left) = self.left.checked_sub(1) else {
            return false;
        };
        self.left = left;
        self.jitter = jitter(rng);
        self.rto *= 2;
        true
    }
}

// A value between -0.25s and 0.25s
fn jitter(rng: &mut SeededRng) -> f32 {
    rng.random::<f32>() * JITTER_RANGE - (JITTER_RANGE / 2.0)
}

/// A point in time the caller is asked to come back at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deadline {
    /// Never fires.
    Disabled,
    /// Armed on the next `handle_timeout`.
    Unarmed,
    Armed(Instant),
}

impl Deadline {
    pub fn arm_if_unarmed(&mut self, now: Instant, after: Duration) {
        if *self == Deadline::Unarmed {
            *self = Deadline::Armed(now + after);
        }
    }

    pub fn has_passed(&self, now: Instant) -> bool {
        matches!(self, Deadline::Armed(at) if now >= *at)
    }

    pub fn instant(&self) -> Option<Instant> {
        match self {
            Deadline::Armed(at) => Some(*at),
            _ => None,
        }
    }
}
