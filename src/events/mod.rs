//! Events emitted by the hold detector.
//!
//! A single broadcast channel fans these out to the desktop notifier and to
//! subscribed IPC clients.

use serde::{Deserialize, Serialize};

use crate::keys::KeyCode;

/// A key stayed down continuously past the configured threshold.
///
/// Emitted at most once per press; re-pressing the key starts a new hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldEvent {
    /// Virtual keycode of the held key.
    pub code: KeyCode,

    /// True elapsed hold time when the timer fired, in milliseconds.
    ///
    /// Measured against the press timestamp, so it is at least the threshold
    /// but may exceed it slightly under scheduling delay.
    pub duration_ms: u64,
}

impl std::fmt::Display for HoldEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KEY_HELD {} ({}ms)", self.code, self.duration_ms)
    }
}
