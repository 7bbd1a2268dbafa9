//! Unix domain socket server for IPC
//!
//! Handles status queries and threshold changes, and streams hold
//! notifications to clients that subscribe.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::SettingsStore;
use crate::detect::DetectorEvent;
use crate::events::HoldEvent;

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// Upper bound on a single request frame
const MAX_FRAME_LEN: usize = 64 * 1024;

/// IPC server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Source of hold events; each subscribing client gets its own receiver
    hold_tx: broadcast::Sender<HoldEvent>,
    /// Inbox of the hold detector, for forwarding threshold changes
    detector_tx: mpsc::Sender<DetectorEvent>,
    /// Persisted settings, shared with the rest of the daemon
    settings: Arc<Mutex<SettingsStore>>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server bound to `socket_path`
    pub fn new(
        socket_path: &Path,
        hold_tx: broadcast::Sender<HoldEvent>,
        detector_tx: mpsc::Sender<DetectorEvent>,
        settings: Arc<Mutex<SettingsStore>>,
        threshold_ms: u64,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let status = DaemonStatus {
            threshold_ms,
            ..DaemonStatus::default()
        };
        let state = Arc::new(RwLock::new(ServerState {
            status,
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            hold_tx,
            detector_tx,
            settings,
        })
    }

    /// Record whether the global key listener is running
    pub async fn set_listener_active(&self, active: bool) {
        self.state.write().await.status.listener_active = active;
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let hold_rx = self.hold_tx.subscribe();
                    let detector_tx = self.detector_tx.clone();
                    let settings = Arc::clone(&self.settings);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, hold_rx, detector_tx, settings) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    ///
    /// Serves request-response frames until the client subscribes, then
    /// switches the connection to a one-way notification stream.
    async fn handle_client(
        mut stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        hold_rx: broadcast::Receiver<HoldEvent>,
        detector_tx: mpsc::Sender<DetectorEvent>,
        settings: Arc<Mutex<SettingsStore>>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_FRAME_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            stream.read_exact(&mut msg_buf).await?;

            // Parse request
            let request: Request =
                serde_json::from_slice(&msg_buf).context("failed to parse request")?;

            debug!(?request, "received request");

            let subscribe = matches!(request, Request::Subscribe);
            let response = Self::process_request(request, &state, &detector_tx, &settings).await;
            Self::send_message(&mut stream, &response).await?;

            if subscribe {
                debug!("client subscribed to hold notifications");
                return Self::stream_notifications(stream, hold_rx).await;
            }
        }
    }

    /// Forward hold events to a subscribed client until it disconnects
    async fn stream_notifications(
        mut stream: UnixStream,
        mut hold_rx: broadcast::Receiver<HoldEvent>,
    ) -> Result<()> {
        loop {
            match hold_rx.recv().await {
                Ok(event) => {
                    let note = Notification::Hold(event);
                    if Self::send_message(&mut stream, &note).await.is_err() {
                        debug!("subscriber disconnected");
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber lagged behind hold events");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        stream.write_all(&msg_len).await?;
        stream.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        detector_tx: &mpsc::Sender<DetectorEvent>,
        settings: &Arc<Mutex<SettingsStore>>,
    ) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                Response::Status(state.status.clone())
            }

            Request::SetThreshold { threshold_ms } => {
                let mut settings = settings.lock().await;
                match settings.set_threshold(threshold_ms) {
                    Ok(()) => {
                        // The detector picks the new value up for the
                        // next press; in-flight timers are unaffected.
                        if detector_tx
                            .send(DetectorEvent::SetThreshold(threshold_ms))
                            .await
                            .is_err()
                        {
                            warn!("detector inbox closed, threshold not forwarded");
                        }
                        state.write().await.status.threshold_ms = threshold_ms;
                        info!(threshold_ms, "hold threshold changed via IPC");
                        Response::ThresholdChanged { threshold_ms }
                    }
                    Err(e) => Response::Error {
                        code: "invalid_threshold".to_string(),
                        message: e.to_string(),
                    },
                }
            }

            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}
