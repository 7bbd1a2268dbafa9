//! Desktop notification sink for hold events
//!
//! Subscribes to the detector's broadcast channel and raises one desktop
//! notification per hold event. Delivery is fire-and-forget; failures are
//! logged and swallowed.

use notify_rust::Notification;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::events::HoldEvent;

/// Forwards hold events to the desktop notification service
pub struct Notifier {
    hold_rx: broadcast::Receiver<HoldEvent>,
}

impl Notifier {
    /// Create a notifier over a hold event subscription
    pub fn new(hold_rx: broadcast::Receiver<HoldEvent>) -> Self {
        Self { hold_rx }
    }

    /// Run until the broadcast channel closes
    pub async fn run(mut self) {
        loop {
            match self.hold_rx.recv().await {
                Ok(event) => {
                    debug!(%event, "showing hold notification");
                    show(event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "notifier lagged behind hold events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Notification body text for a hold event
fn body(event: &HoldEvent) -> String {
    format!(
        "Key {} held for {} milliseconds",
        event.code.name(),
        event.duration_ms
    )
}

/// Show a single notification on a blocking worker thread.
fn show(event: HoldEvent) {
    tokio::task::spawn_blocking(move || {
        let result = Notification::new()
            .summary("Key Held")
            .body(&body(&event))
            .show();
        if let Err(e) = result {
            warn!(?e, "failed to show notification");
        }
    });
}
