//! Correlation id generation.

/// Largest id handed out before the counter wraps to 0.
pub const MAX_SYNC: u32 = 1_000_000;

/// Monotonic correlation id counter, owned by one connection.
///
/// Produces `0, 1, ..., MAX_SYNC, 0, 1, ...`.
#[derive(Debug)]
pub struct SyncGenerator {
    next: u32,
    max: u32,
}

impl SyncGenerator {
    /// Create a generator starting at 0.
    pub fn new() -> Self {
        Self::with_max(MAX_SYNC)
    }

    /// Create a generator that wraps after `max` instead of [`MAX_SYNC`].
    pub fn with_max(max: u32) -> Self {
        Self { next: 0, max }
    }

    /// Largest id produced before wrapping.
    #[inline]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Number of distinct ids in one cycle.
    #[inline]
    pub fn cycle_len(&self) -> u64 {
        u64::from(self.max) + 1
    }

    /// Next id in the cycle.
    pub fn next_id(&mut self) -> u32 {
        if self.next > self.max {
            self.next = 0;
        }
        let id = self.next;
        self.next = id.wrapping_add(1);
        id
    }
}

impl Default for SyncGenerator {
    fn default() -> Self {
        Self::new()
    }
}
