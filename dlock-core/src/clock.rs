//! Lamport logical clock.

/// Monotonic Lamport timestamp.
///
/// Advanced by [`tick`](Self::tick) on every local event and by
/// [`observe`](Self::observe) on every received message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicalClock {
    time: u64,
}

impl LogicalClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn tick(&mut self) {
        self.time += 1;
    }

    /// Merge a received timestamp: `time = max(time, received) + 1`.
    pub fn observe(&mut self, received: u64) {
        self.time = self.time.max(received) + 1;
    }
}
