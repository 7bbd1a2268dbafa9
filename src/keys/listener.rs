//! Global key listener using macOS CGEventTap
//!
//! Monitors system-wide key down/up events and feeds them to the hold
//! detector. Runs on a dedicated thread with its own CFRunLoop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    EventField,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::code::KeyCode;
use crate::clock::Clock;
use crate::detect::DetectorEvent;

/// Direction of a key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    /// The key went down.
    Down,
    /// The key came back up.
    Up,
}

/// A single key transition observed by the listener.
#[derive(Debug, Clone, Copy)]
pub struct KeyInput {
    /// Which key changed.
    pub code: KeyCode,
    /// Whether it went down or up.
    pub kind: KeyEventKind,
    /// Monotonic milliseconds at which the transition was observed.
    pub at_ms: u64,
}

/// Global listener that forwards key press/release events to the detector
pub struct KeyListener {
    event_tx: mpsc::Sender<DetectorEvent>,
    clock: Clock,
    running: Arc<AtomicBool>,
}

impl KeyListener {
    /// Create a new key listener
    pub fn new(event_tx: mpsc::Sender<DetectorEvent>, clock: Clock) -> Self {
        Self {
            event_tx,
            clock,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the key listener
    ///
    /// This spawns a dedicated thread that runs a CFRunLoop to receive
    /// CGEventTap callbacks. The listener runs until `stop()` is called
    /// or the program exits.
    pub fn start(&self) -> Result<(), ListenerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ListenerError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let clock = self.clock.clone();
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("key-listener".to_string())
            .spawn(move || {
                info!("key listener thread started");

                if let Err(e) = run_event_loop(event_tx, clock, running.clone()) {
                    error!(?e, "key listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("key listener thread stopped");
            })
            .map_err(|e| ListenerError::ThreadSpawn(e.to_string()))?;

        Ok(())
    }

    /// Stop the key listener
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // The CFRunLoop will exit on the next iteration
        CFRunLoop::get_main().stop();
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the key listener
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("key listener is already running")]
    AlreadyRunning,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

/// Run the CFRunLoop with the event tap
fn run_event_loop(
    event_tx: mpsc::Sender<DetectorEvent>,
    clock: Clock,
    running: Arc<AtomicBool>,
) -> Result<(), ListenerError> {
    // Create a channel to carry events out of the tap callback
    let (callback_tx, callback_rx) = std::sync::mpsc::channel::<KeyInput>();

    // CGEventTap callback - must be fast and non-blocking
    let callback = move |_proxy: core_graphics::event::CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
          -> Option<CGEvent> {
        match event_type {
            CGEventType::KeyDown | CGEventType::KeyUp => {
                // OS-level auto-repeat re-reports a held key as fresh
                // presses, which would keep restarting the hold window.
                // The tap drops repeats so only real transitions reach
                // the detector.
                let repeat = event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT);
                if repeat == 0 {
                    let code =
                        event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
                    let kind = if matches!(event_type, CGEventType::KeyDown) {
                        KeyEventKind::Down
                    } else {
                        KeyEventKind::Up
                    };
                    let _ = callback_tx.send(KeyInput {
                        code: KeyCode(code),
                        kind,
                        at_ms: clock.now_ms(),
                    });
                }
            }
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                warn!("event tap disabled, will re-enable");
                // The tap will be re-enabled automatically
            }
            _ => {}
        }
        Some(event.clone())
    };

    // Create the event tap
    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown, CGEventType::KeyUp],
        callback,
    )
    .map_err(|_| {
        error!("failed to create event tap - is Accessibility permission granted?");
        ListenerError::EventTapCreation
    })?;

    // Enable the tap
    tap.enable();

    // Create a run loop source and add it to the current run loop
    let run_loop_source = tap
        .mach_port
        .create_runloop_source(0)
        .map_err(|_| ListenerError::EventTapCreation)?;
    let run_loop = CFRunLoop::get_current();

    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }

    info!("event tap created and enabled");

    // Process events in a loop
    while running.load(Ordering::SeqCst) {
        // Run the loop for a short interval, then check for new events
        unsafe {
            CFRunLoop::run_in_mode(
                kCFRunLoopDefaultMode,
                std::time::Duration::from_millis(100),
                true,
            );
        }

        // Forward any events captured by the callback
        while let Ok(input) = callback_rx.try_recv() {
            debug!(code = %input.code, kind = ?input.kind, at_ms = input.at_ms, "key event");

            // We use blocking_send since we're not in an async context
            if event_tx
                .blocking_send(DetectorEvent::Key(input))
                .is_err()
            {
                warn!("failed to forward key event - channel closed?");
                break;
            }
        }
    }

    // Tap will be automatically cleaned up when it goes out of scope

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = KeyListener::new(tx, Clock::new());
        assert!(!listener.is_running());
    }
}
