// Byte accounting for a measurement run
// (c) 2024 Ross Younger

/// Distance between successive `byteslog` milestones.
///
/// This does not scale with the byte limit.
pub const THRESHOLD_INCREMENT: u64 = 1_000_000;

/// Byte counters for one run.
///
/// `window_bytes` covers the current reporting second; `total_bytes` everything since the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accounting {
    window_bytes: u64,
    total_bytes: u64,
    next_threshold: u64,
}

impl Default for Accounting {
    fn default() -> Self {
        Self {
            window_bytes: 0,
            total_bytes: 0,
            next_threshold: THRESHOLD_INCREMENT,
        }
    }
}

impl Accounting {
    /// Bytes received since the last report tick
    #[must_use]
    pub fn window_bytes(&self) -> u64 {
        self.window_bytes
    }
    /// Bytes received since the first byte of the run
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
    /// The next cumulative milestone to be logged
    #[must_use]
    pub fn next_threshold(&self) -> u64 {
        self.next_threshold
    }

    /// Adds received bytes to both counters.
    ///
    /// Panics: counter overflow means the accounting is corrupt; there is no sensible way to continue.
    pub fn record(&mut self, len: u64) {
        self.window_bytes = self
            .window_bytes
            .checked_add(len)
            .unwrap_or_else(|| panic!("window byte counter overflowed"));
        self.total_bytes = self
            .total_bytes
            .checked_add(len)
            .unwrap_or_else(|| panic!("total byte counter overflowed"));
        assert!(
            self.window_bytes <= self.total_bytes,
            "window bytes {} exceed total {}",
            self.window_bytes,
            self.total_bytes
        );
    }

    /// Zeroes the window counter, returning what it held
    pub fn take_window(&mut self) -> u64 {
        std::mem::take(&mut self.window_bytes)
    }

    /// If the total has passed the next milestone, advances the milestone by one step and returns the total.
    ///
    /// At most one step is taken per call, however far the total has run ahead.
    pub fn cross_threshold(&mut self) -> Option<u64> {
        if self.total_bytes > self.next_threshold {
            self.next_threshold += THRESHOLD_INCREMENT;
            Some(self.total_bytes)
        } else {
            None
        }
    }
}
