//! Monotonic millisecond clock shared by the key listener and the detector.

use tokio::time::Instant;

/// Millisecond timestamps measured from a fixed origin.
///
/// Built on `tokio::time::Instant` so the timestamps share a time base with
/// the detector's one-shot timers, including under a paused test clock.
#[derive(Debug, Clone)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    /// Create a clock with its origin at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the clock's origin.
    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
