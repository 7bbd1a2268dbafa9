//! Core hold detection state machine
//!
//! Tracks each key independently: a press arms a one-shot timer for the
//! current threshold, a release disarms it, and a timer that fires against a
//! still-held key emits exactly one [`HoldEvent`]. All state mutation happens
//! on the detector's run loop; timers are sleep tasks that post back into the
//! same inbox, so handlers never race each other.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::events::HoldEvent;
use crate::keys::{KeyCode, KeyEventKind, KeyInput};

/// Inputs consumed by the detector's run loop
#[derive(Debug)]
pub enum DetectorEvent {
    /// A key transition from the listener
    Key(KeyInput),
    /// A previously armed one-shot timer elapsed
    TimerFired {
        /// Key the timer was armed for
        code: KeyCode,
        /// Token the timer was armed with; stale tokens are ignored
        token: u64,
    },
    /// Adopt a new hold threshold for subsequent presses
    SetThreshold(u64),
    /// Cancel all pending timers and forget all key state
    Reset,
}

/// A scheduled one-shot timer for a single key.
///
/// At most one exists per key. The token distinguishes the current timer
/// from a cancelled predecessor whose fire message may already be in flight.
struct PendingTimer {
    token: u64,
    /// Threshold the timer was armed with; later threshold changes do not
    /// affect timers already in flight.
    armed_threshold_ms: u64,
    task: JoinHandle<()>,
}

/// Per-key tracking state, created lazily on first press.
#[derive(Default)]
struct KeyHoldState {
    /// Press timestamp of the current hold, absent when the key is up.
    pressed_at: Option<u64>,
    timer: Option<PendingTimer>,
}

/// The state machine that turns key transitions into hold events
pub struct HoldDetector {
    /// Minimum continuous hold duration that qualifies, in milliseconds
    threshold_ms: u64,
    /// Per-key state, owned exclusively by the detector
    keys: HashMap<KeyCode, KeyHoldState>,
    /// Monotonically increasing timer token allocator
    next_token: u64,
    /// Channel for emitting hold events
    hold_tx: broadcast::Sender<HoldEvent>,
    /// The detector's own inbox, handed to spawned timers
    inbox_tx: mpsc::Sender<DetectorEvent>,
    /// Time base for timer-fire timestamps
    clock: Clock,
}

impl HoldDetector {
    /// Create a new detector with the given hold threshold
    pub fn new(
        threshold_ms: u64,
        hold_tx: broadcast::Sender<HoldEvent>,
        inbox_tx: mpsc::Sender<DetectorEvent>,
        clock: Clock,
    ) -> Self {
        Self {
            threshold_ms,
            keys: HashMap::new(),
            next_token: 0,
            hold_tx,
            inbox_tx,
            clock,
        }
    }

    /// Run the detector, processing events from its inbox
    ///
    /// Returns when the inbox closes; all pending timers are cancelled and
    /// key state is cleared on the way out.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<DetectorEvent>) {
        info!(threshold_ms = self.threshold_ms, "hold detector started");

        while let Some(event) = rx.recv().await {
            match event {
                DetectorEvent::Key(input) => match input.kind {
                    KeyEventKind::Down => self.handle_key_down(input.code, input.at_ms),
                    KeyEventKind::Up => self.handle_key_up(input.code),
                },
                DetectorEvent::TimerFired { code, token } => {
                    let now_ms = self.clock.now_ms();
                    self.handle_timer_fired(code, token, now_ms);
                }
                DetectorEvent::SetThreshold(threshold_ms) => {
                    self.handle_set_threshold(threshold_ms);
                }
                DetectorEvent::Reset => self.reset(),
            }
        }

        self.reset();
        info!("hold detector stopped");
    }

    /// Handle a key going down
    ///
    /// A press always restarts the hold window, including a re-press the
    /// host reports before any release. The previous timer, if any, is
    /// cancelled first so no two timers race for the same key.
    fn handle_key_down(&mut self, code: KeyCode, at_ms: u64) {
        self.next_token += 1;
        let token = self.next_token;
        let threshold_ms = self.threshold_ms;
        let inbox = self.inbox_tx.clone();

        let entry = self.keys.entry(code).or_default();
        if let Some(prev) = entry.timer.take() {
            prev.task.abort();
            debug!(%code, stale = prev.token, "re-press cancelled pending timer");
        }
        entry.pressed_at = Some(at_ms);

        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(threshold_ms)).await;
            let _ = inbox.send(DetectorEvent::TimerFired { code, token }).await;
        });
        entry.timer = Some(PendingTimer {
            token,
            armed_threshold_ms: threshold_ms,
            task,
        });

        debug!(%code, at_ms, token, "key down, timer armed");
    }

    /// Handle a key coming back up
    ///
    /// Clears the press timestamp and disarms the pending timer, so a key
    /// released before the threshold never produces an event. Releasing a
    /// key that was never tracked is a no-op.
    fn handle_key_up(&mut self, code: KeyCode) {
        let Some(entry) = self.keys.get_mut(&code) else {
            debug!(%code, "release of untracked key ignored");
            return;
        };

        entry.pressed_at = None;
        if let Some(timer) = entry.timer.take() {
            timer.task.abort();
            debug!(%code, token = timer.token, "release disarmed pending timer");
        }
    }

    /// Handle a one-shot timer elapsing
    ///
    /// The token must match the key's current pending timer; a stale token
    /// means the timer was superseded or disarmed after its fire message was
    /// already in flight. Even with a matching token the press timestamp is
    /// re-checked before emitting, so a release processed in the same batch
    /// still suppresses the event.
    fn handle_timer_fired(&mut self, code: KeyCode, token: u64, now_ms: u64) {
        let Some(entry) = self.keys.get_mut(&code) else {
            debug!(%code, token, "timer fired for unknown key, ignored");
            return;
        };

        let pending = match entry.timer.take() {
            Some(pending) if pending.token == token => pending,
            other => {
                entry.timer = other;
                debug!(%code, token, "stale timer fire ignored");
                return;
            }
        };

        let Some(pressed_at) = entry.pressed_at else {
            debug!(%code, token, "key released before timer processed, no event");
            return;
        };

        let duration_ms = now_ms.saturating_sub(pressed_at);
        if duration_ms < pending.armed_threshold_ms {
            debug!(%code, duration_ms, "hold shorter than armed threshold, no event");
            return;
        }

        let event = HoldEvent { code, duration_ms };
        info!(%code, duration_ms, "key held past threshold");
        let _ = self.hold_tx.send(event);
    }

    /// Adopt a new threshold for subsequent presses
    ///
    /// Zero is rejected and the previous value kept; timers already in
    /// flight keep the duration they were armed with either way.
    fn handle_set_threshold(&mut self, threshold_ms: u64) {
        if threshold_ms == 0 {
            warn!(
                kept_ms = self.threshold_ms,
                "rejecting zero hold threshold"
            );
            return;
        }

        info!(
            old_ms = self.threshold_ms,
            new_ms = threshold_ms,
            "hold threshold updated"
        );
        self.threshold_ms = threshold_ms;
    }

    /// Cancel every pending timer and clear all key state
    pub fn reset(&mut self) {
        let mut cancelled = 0usize;
        for state in self.keys.values_mut() {
            if let Some(timer) = state.timer.take() {
                timer.task.abort();
                cancelled += 1;
            }
        }
        self.keys.clear();

        if cancelled > 0 {
            debug!(cancelled, "reset cancelled pending timers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test fixture driving a detector run loop over a paused clock.
    struct Harness {
        tx: mpsc::Sender<DetectorEvent>,
        holds: broadcast::Receiver<HoldEvent>,
        clock: Clock,
    }

    impl Harness {
        async fn start(threshold_ms: u64) -> Self {
            let (tx, rx) = mpsc::channel(32);
            let (hold_tx, holds) = broadcast::channel(16);
            let clock = Clock::new();
            let mut detector = HoldDetector::new(threshold_ms, hold_tx, tx.clone(), clock.clone());
            tokio::spawn(async move {
                detector.run(rx).await;
            });
            Self { tx, holds, clock }
        }

        async fn press(&self, code: u16) {
            self.tx
                .send(DetectorEvent::Key(KeyInput {
                    code: KeyCode(code),
                    kind: KeyEventKind::Down,
                    at_ms: self.clock.now_ms(),
                }))
                .await
                .unwrap();
        }

        async fn release(&self, code: u16) {
            self.tx
                .send(DetectorEvent::Key(KeyInput {
                    code: KeyCode(code),
                    kind: KeyEventKind::Up,
                    at_ms: self.clock.now_ms(),
                }))
                .await
                .unwrap();
        }

        /// Let the paused clock advance, firing any due timers.
        async fn advance(&self, ms: u64) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            // Give the run loop a chance to process in-flight messages.
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
        }

        fn drain(&mut self) -> Vec<HoldEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.holds.try_recv() {
                out.push(event);
            }
            out
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_before_threshold_is_silent() {
        let mut h = Harness::start(3000).await;

        h.press(0).await;
        h.advance(1000).await;
        h.release(0).await;
        h.advance(4000).await;

        assert!(h.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_past_threshold_emits_once() {
        let mut h = Harness::start(3000).await;

        h.press(0).await;
        h.advance(3500).await;

        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, KeyCode(0));
        assert!(events[0].duration_ms >= 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repress_restarts_the_window() {
        let mut h = Harness::start(3000).await;

        h.press(0).await;
        h.advance(1000).await;
        // Re-press before any release: the window restarts at t=1000.
        h.press(0).await;

        h.advance(2500).await; // t=3500: original window elapsed, new one not
        assert!(h.drain().is_empty());

        h.advance(1000).await; // t=4500: new window elapsed at t=4000
        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_ms, 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_keys_overlap() {
        let mut h = Harness::start(3000).await;

        h.press(0).await;
        h.advance(1000).await;
        h.press(1).await;
        h.advance(5000).await;

        let events = h.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].code, KeyCode(0));
        assert_eq!(events[0].duration_ms, 3000);
        assert_eq!(events[1].code, KeyCode(1));
        assert_eq!(events[1].duration_ms, 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_of_untracked_key_is_noop() {
        let mut h = Harness::start(3000).await;

        h.release(42).await;
        h.advance(4000).await;
        assert!(h.drain().is_empty());

        // The detector still works normally afterwards.
        h.press(42).await;
        h.advance(3500).await;
        assert_eq!(h.drain().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_hold_emits_exactly_once() {
        let mut h = Harness::start(3000).await;

        h.press(0).await;
        h.advance(30000).await;

        assert_eq!(h.drain().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_update_applies_to_next_press() {
        let mut h = Harness::start(3000).await;

        h.press(0).await;
        h.tx.send(DetectorEvent::SetThreshold(1000)).await.unwrap();

        // The in-flight timer for key 0 keeps its armed 3000ms.
        h.advance(1500).await;
        assert!(h.drain().is_empty());

        // A fresh press uses the new threshold.
        h.press(1).await;
        h.advance(1100).await; // t=2600: key 1 fired at t=2500
        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, KeyCode(1));
        assert_eq!(events[0].duration_ms, 1000);

        h.advance(1000).await; // t=3600: key 0 fired at t=3000
        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, KeyCode(0));
        assert_eq!(events[0].duration_ms, 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_threshold_rejected() {
        let mut h = Harness::start(3000).await;

        h.tx.send(DetectorEvent::SetThreshold(0)).await.unwrap();

        h.press(0).await;
        h.advance(1500).await;
        assert!(h.drain().is_empty());

        h.advance(2000).await;
        assert_eq!(h.drain().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_pending_timers() {
        let mut h = Harness::start(3000).await;

        h.press(0).await;
        h.press(1).await;
        h.advance(1000).await;
        h.tx.send(DetectorEvent::Reset).await.unwrap();
        h.advance(5000).await;

        assert!(h.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_then_immediate_repress() {
        let mut h = Harness::start(3000).await;

        h.press(0).await;
        h.advance(2000).await;
        h.release(0).await;
        h.press(0).await;
        h.advance(3500).await; // new hold qualifies at t=5000

        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_ms, 3000);
    }
}
