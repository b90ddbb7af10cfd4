use crate::Error;

/// Smallest allowed window size.
pub const MIN_WINDOW_SIZE: u64 = 32;

/// Sliding anti-replay window over DTLS record sequence numbers.
///
/// The window tracks sequence numbers in `left..=right` where
/// `right = left + size`. A bitmap tracks which of those have been seen.
/// Marking a number past the middle of the window slides it forward so the
/// highest accepted number sits in the middle, leaving room for both late
/// and early arrivals. Numbers above `right` pass [`SlidingWindow::check`];
/// marking one moves the whole window up to it.
///
/// Each epoch has its own window state; [`SlidingWindow::reset`] is called when
/// the incoming epoch advances.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    size: u64,
    left: u64,
    seen: Vec<u64>,
    highest: Option<u64>,
}

impl SlidingWindow {
    /// Create a window of `size`, starting at sequence number 0.
    ///
    /// Fails with `Error::Configuration` if `size` is below 32.
    pub fn new(size: u64) -> Result<Self, Error> {
        if size < MIN_WINDOW_SIZE {
            return Err(Error::Configuration(format!(
                "sliding window must be at least {}, got {}",
                MIN_WINDOW_SIZE, size
            )));
        }

        let words = (size as usize + 1).div_ceil(64);

        Ok(SlidingWindow {
            size,
            left: 0,
            seen: vec![0; words],
            highest: None,
        })
    }

    /// Lower bound (inclusive).
    pub fn left(&self) -> u64 {
        self.left
    }

    /// Upper bound (inclusive).
    pub fn right(&self) -> u64 {
        self.left.saturating_add(self.size)
    }

    /// Highest sequence number marked as seen since the last reset.
    pub fn highest(&self) -> Option<u64> {
        self.highest
    }

    /// Whether `seq` falls inside the window.
    pub fn is_match(&self, seq: u64) -> bool {
        seq >= self.left && seq <= self.right()
    }

    /// Whether `seq` is above the window.
    pub fn is_ahead(&self, seq: u64) -> bool {
        seq > self.right()
    }

    /// Whether `seq` has not been seen and is not below the window.
    ///
    /// Does not mutate the window.
    pub fn check(&self, seq: u64) -> bool {
        if self.is_ahead(seq) {
            return true;
        }
        self.is_match(seq) && !self.bit(seq - self.left)
    }

    /// Mark `seq` as seen.
    ///
    /// Callers must have passed [`SlidingWindow::check`] first, and for a
    /// number above the window, authenticated the record.
    pub fn mark(&mut self, seq: u64) {
        if seq < self.left {
            return;
        }

        let middle = self.left + self.size / 2;
        if seq > middle {
            self.slide(seq - middle);
        }

        self.set_bit(seq - self.left, true);
        self.highest = Some(self.highest.map_or(seq, |h| h.max(seq)));
    }

    /// Reinitialize the window to `value..=value + size`, forgetting all seen numbers.
    pub fn reset(&mut self, value: u64) {
        self.left = value;
        self.highest = None;
        self.seen.iter_mut().for_each(|w| *w = 0);
    }

    fn slide(&mut self, shift: u64) {
        let bits = self.size + 1;
        if shift >= bits {
            self.seen.iter_mut().for_each(|w| *w = 0);
            self.left += shift;
            return;
        }
        for i in 0..bits {
            let src = i + shift;
            let v = src < bits && self.bit(src);
            self.set_bit(i, v);
        }
        self.left += shift;
    }

    fn bit(&self, index: u64) -> bool {
        let word = (index / 64) as usize;
        let mask = 1u64 << (index % 64);
        self.seen[word] & mask != 0
    }

    fn set_bit(&mut self, index: u64, value: bool) {
        let word = (index / 64) as usize;
        let mask = 1u64 << (index % 64);
        if value {
            self.seen[word] |= mask;
        } else {
            self.seen[word] &= !mask;
        }
    }
}
