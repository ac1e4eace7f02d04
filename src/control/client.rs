//! Persistent control-plane channel.
//!
//! [`ControlPlaneClient`] keeps one Socket.IO connection open to the
//! control plane, reconnecting with exponential backoff. On every
//! namespace connect it registers this host. Inbound `botControl` and
//! `fileUpdate` events are decoded at the boundary and forwarded to the
//! supervisor over an mpsc channel; outbound events are queued to the
//! connection's writer.
//!
//! Heartbeats fall back to the HTTP API when the channel is down. Inbound
//! commands have no fallback path.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::control::http::ApiClient;
use crate::control::protocol::{self, Packet};
use crate::control::Uplink;
use crate::models::command::{ControlCommand, OutboundEvent};
use crate::models::host::HostStatus;
use crate::{AppError, Result};

const OUTBOUND_CAPACITY: usize = 64;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Time allowed for the WebSocket upgrade, and between connecting and
/// receiving the engine open packet.
const HANDSHAKE_WINDOW: Duration = Duration::from_secs(20);
const CLOSE_WAIT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a connected session ended.
enum SessionEnd {
    /// Shutdown was requested.
    Cancelled,
    /// The server closed the connection.
    Closed,
}

/// Connection parameters shared by every reconnect attempt.
struct Connection {
    url: String,
    connect_timeout: Duration,
    host_name: String,
    connected: Arc<AtomicBool>,
    commands: mpsc::Sender<ControlCommand>,
    cancel: CancellationToken,
}

/// Persistent channel to the control plane plus its HTTP fallback.
pub struct ControlPlaneClient {
    api: ApiClient,
    connected: Arc<AtomicBool>,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ControlPlaneClient {
    /// Start the connection task and return the client.
    ///
    /// Decoded inbound commands are delivered to `commands`. The connection
    /// is attempted in the background; this call does not wait for it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an invalid base URL and
    /// `AppError::Http` if the HTTP fallback client cannot be built.
    pub fn start(
        base_url: &str,
        host_name: impl Into<String>,
        commands: mpsc::Sender<ControlCommand>,
    ) -> Result<Arc<Self>> {
        Self::start_with_connect_timeout(base_url, host_name, commands, HANDSHAKE_WINDOW)
    }

    /// Like [`start`](Self::start), bounding each WebSocket connect
    /// attempt by `connect_timeout` instead of the default window.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn start_with_connect_timeout(
        base_url: &str,
        host_name: impl Into<String>,
        commands: mpsc::Sender<ControlCommand>,
        connect_timeout: Duration,
    ) -> Result<Arc<Self>> {
        let api = ApiClient::new(base_url)?;
        let url = protocol::channel_url(base_url)?;
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let connection = Connection {
            url,
            connect_timeout,
            host_name: host_name.into(),
            connected: Arc::clone(&connected),
            commands,
            cancel: cancel.clone(),
        };
        let span = info_span!("control_channel", url = %connection.url);
        let task = tokio::spawn(connection.run(outbound_rx).instrument(span));

        Ok(Arc::new(Self {
            api,
            connected,
            outbound,
            cancel,
            task: Mutex::new(Some(task)),
        }))
    }

    /// HTTP API client sharing this client's base URL.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    async fn emit_event(&self, event: OutboundEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(AppError::Channel(format!(
                "cannot emit {}: not connected",
                event.name()
            )));
        }
        let frame = protocol::encode_event(event.name(), &event.payload());
        self.outbound
            .send(frame)
            .await
            .map_err(|err| AppError::Channel(format!("failed to queue {}: {err}", event.name())))
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if timeout(CLOSE_WAIT, task).await.is_err() {
                warn!("control channel task did not finish in time");
            }
            info!("control channel closed");
        }
    }
}

impl Uplink for ControlPlaneClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: OutboundEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.emit_event(event))
    }

    fn post_heartbeat<'a>(
        &'a self,
        status: &'a HostStatus,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.api.post_heartbeat(status))
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.shutdown())
    }
}

impl Connection {
    /// Reconnect loop; exits when cancelled or when the command receiver
    /// is gone.
    async fn run(self, mut outbound_rx: mpsc::Receiver<String>) {
        let mut backoff = INITIAL_RETRY_DELAY;
        loop {
            let attempt = tokio::select! {
                () = self.cancel.cancelled() => break,
                attempt = timeout(self.connect_timeout, connect_async(self.url.as_str())) => attempt,
            };

            match attempt {
                Ok(Ok((ws, _response))) => {
                    info!("control channel connected");
                    backoff = INITIAL_RETRY_DELAY;
                    // Frames queued before the previous session dropped are stale.
                    while outbound_rx.try_recv().is_ok() {}

                    let ended = self.drive(ws, &mut outbound_rx).await;
                    self.connected.store(false, Ordering::SeqCst);
                    match ended {
                        Ok(SessionEnd::Cancelled) => break,
                        Ok(SessionEnd::Closed) => warn!("control channel disconnected"),
                        Err(err) => warn!(%err, "control channel dropped"),
                    }
                }
                Ok(Err(err)) => warn!(%err, delay = ?backoff, "control channel connect failed"),
                Err(_elapsed) => warn!(
                    limit = ?self.connect_timeout,
                    delay = ?backoff,
                    "control channel connect timed out"
                ),
            }

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_RETRY_DELAY);
        }
        self.connected.store(false, Ordering::SeqCst);
        debug!("control channel task exiting");
    }

    /// Serve one connected WebSocket until it closes or shutdown begins.
    async fn drive(
        &self,
        ws: WsStream,
        outbound_rx: &mut mpsc::Receiver<String>,
    ) -> Result<SessionEnd> {
        let (mut write, mut read) = ws.split();
        let mut deadline = Instant::now() + HANDSHAKE_WINDOW;
        let mut liveness = HANDSHAKE_WINDOW;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    if self.connected.load(Ordering::SeqCst) {
                        let _ = write.send(text(protocol::DISCONNECT)).await;
                    }
                    let _ = write.close().await;
                    return Ok(SessionEnd::Cancelled);
                }
                () = sleep_until(deadline) => {
                    return Err(AppError::Channel("no ping from control plane".into()));
                }
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else {
                        return Ok(SessionEnd::Cancelled);
                    };
                    write.send(text(&frame)).await.map_err(channel_err)?;
                }
                message = read.next() => {
                    let frame = match message {
                        None | Some(Ok(Message::Close(_))) => return Ok(SessionEnd::Closed),
                        Some(Err(err)) => return Err(channel_err(err)),
                        Some(Ok(Message::Text(frame))) => frame,
                        Some(Ok(_)) => continue,
                    };

                    let packet = match protocol::decode(frame.as_str()) {
                        Ok(packet) => packet,
                        Err(err) => {
                            warn!(%err, "undecodable frame from control plane");
                            continue;
                        }
                    };

                    match packet {
                        Packet::Open(handshake) => {
                            debug!(sid = %handshake.sid, "engine handshake received");
                            liveness = handshake.liveness_window();
                            deadline = Instant::now() + liveness;
                            write.send(text(protocol::CONNECT)).await.map_err(channel_err)?;
                        }
                        Packet::Ping => {
                            deadline = Instant::now() + liveness;
                            write.send(text(protocol::PONG)).await.map_err(channel_err)?;
                        }
                        Packet::Connected => {
                            self.connected.store(true, Ordering::SeqCst);
                            let register = OutboundEvent::Register {
                                name: self.host_name.clone(),
                            };
                            let frame = protocol::encode_event(register.name(), &register.payload());
                            write.send(text(&frame)).await.map_err(channel_err)?;
                            info!(host = %self.host_name, "registered with control plane");
                        }
                        Packet::Event { name, payload } => {
                            if !self.forward(&name, payload).await {
                                return Ok(SessionEnd::Cancelled);
                            }
                        }
                        Packet::ConnectError(reason) => {
                            return Err(AppError::Channel(format!("namespace connect refused: {reason}")));
                        }
                        Packet::Close | Packet::Disconnected => return Ok(SessionEnd::Closed),
                        Packet::Pong | Packet::Ignored => {}
                    }
                }
            }
        }
    }

    /// Decode and forward one inbound event. Returns `false` once the
    /// supervisor side has stopped listening.
    async fn forward(&self, name: &str, payload: serde_json::Value) -> bool {
        match ControlCommand::decode(name, payload) {
            Ok(Some(command)) => {
                info!(event = name, ?command, "control command received");
                self.commands.send(command).await.is_ok()
            }
            Ok(None) => {
                debug!(event = name, "ignoring control-plane event");
                true
            }
            Err(err) => {
                warn!(event = name, %err, "rejected control command");
                true
            }
        }
    }
}

fn text(frame: &str) -> Message {
    Message::Text(frame.to_owned().into())
}

fn channel_err(err: tokio_tungstenite::tungstenite::Error) -> AppError {
    AppError::Channel(err.to_string())
}
