//! Hold detection module
//!
//! Turns the raw stream of key down/up events into at-most-one "held"
//! event per qualifying press, using one-shot timers funneled back through
//! the detector's own inbox.

mod detector;

pub use detector::{DetectorEvent, HoldDetector};
