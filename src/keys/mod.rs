//! Key identity and the global keyboard listener.
//!
//! Uses macOS CGEventTap to observe system-wide key down/up events and
//! forwards them, stamped with monotonic milliseconds, to the hold detector.

mod code;
mod listener;

pub use code::KeyCode;
pub use listener::{KeyEventKind, KeyInput, KeyListener, ListenerError};
