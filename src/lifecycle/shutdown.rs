//! Graceful shutdown on SIGTERM and SIGINT

use tokio::signal::unix::{signal, SignalKind};
use tracing::debug;

/// Resolve once the daemon has been asked to stop
pub async fn wait_for_shutdown() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            debug!("received SIGTERM");
        }
        _ = sigint.recv() => {
            debug!("received SIGINT");
        }
    }
}
