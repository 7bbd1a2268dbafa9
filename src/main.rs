//! keyheld-daemon: notifies when a key is held past a threshold
//!
//! The daemon watches global keyboard events via CGEventTap, detects keys
//! held down continuously for longer than a configurable threshold, and
//! raises exactly one desktop notification per qualifying hold. It exposes:
//! - a hold detector with per-key one-shot timers
//! - a persisted settings store for the threshold
//! - an IPC server for status, threshold changes, and hold subscriptions

mod clock;
mod config;
mod detect;
mod events;
mod ipc;
mod keys;
mod lifecycle;
mod notify;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::clock::Clock;
use crate::config::{Config, SettingsStore};
use crate::detect::{DetectorEvent, HoldDetector};
use crate::events::HoldEvent;
use crate::ipc::Server;
use crate::keys::KeyListener;
use crate::lifecycle::wait_for_shutdown;
use crate::notify::Notifier;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "keyheld-daemon starting"
    );

    // Load configuration and persisted settings
    let config = Config::load()?;
    config.ensure_dirs()?;
    let settings = SettingsStore::open(&config.settings_path);
    let threshold_ms = settings.threshold_ms();
    let settings = Arc::new(Mutex::new(settings));
    info!(?config.socket_path, threshold_ms, "configuration loaded");

    // Shared monotonic time base for event stamps and timers
    let clock = Clock::new();

    // Create channels for inter-component communication
    // Key listener and timers -> detector inbox
    let (detector_tx, detector_rx) = mpsc::channel::<DetectorEvent>(64);
    // Detector -> notifier and IPC subscribers
    let (hold_tx, _hold_rx) = broadcast::channel::<HoldEvent>(64);

    // Create the hold detector
    let mut detector = HoldDetector::new(
        threshold_ms,
        hold_tx.clone(),
        detector_tx.clone(),
        clock.clone(),
    );

    // Create and start the key listener (runs on a dedicated thread)
    let key_listener = KeyListener::new(detector_tx.clone(), clock);
    let listener_active = match key_listener.start() {
        Ok(()) => {
            info!("key listener started");
            true
        }
        Err(e) => {
            error!(?e, "failed to start key listener");
            warn!("continuing without key events - check Accessibility permissions");
            false
        }
    };

    // Desktop notification sink
    let notifier = Notifier::new(hold_tx.subscribe());

    // IPC server
    let server = Server::new(
        &config.socket_path,
        hold_tx.clone(),
        detector_tx.clone(),
        Arc::clone(&settings),
        threshold_ms,
    )?;
    server.set_listener_active(listener_active).await;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the hold detector (processes key events and timer firings)
        _ = detector.run(detector_rx) => {
            info!("hold detector exited");
        }

        // Forward hold events to the desktop notifier
        _ = notifier.run() => {
            info!("notifier exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        _ = wait_for_shutdown() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    key_listener.stop();
    detector.reset();
    server.shutdown().await;

    info!("keyheld-daemon stopped");

    Ok(())
}
