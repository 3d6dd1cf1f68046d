pub mod envelope;
pub mod error;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_core::{EventBus, topics};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use snafu::{ResultExt, ensure};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsFrame;

use envelope::Translation;
pub use error::{LiveError, LiveResult};
use error::{InvalidUrlSnafu, MissingCredentialSnafu};

/// Live channel tuning; defaults mirror the production client (1 s backoff
/// base, five attempts, 30 s keep-alive).
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub ws_url: String,
    pub reconnect_base: Duration,
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8000".to_string(),
            reconnect_base: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Diagnostic snapshot of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
}

/// Bounded exponential backoff: the nth retry waits `base * 2^(n-1)`, and no
/// retry is offered once the attempt budget is spent.
#[derive(Debug)]
pub struct ReconnectPolicy {
    base: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            attempts: 0,
        }
    }

    /// Consumes one attempt and returns its delay, or `None` when exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let delay = self.base * 2u32.saturating_pow(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Called after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Spends the whole budget at once; used by deliberate disconnects to
    /// suppress further reconnection.
    pub fn exhaust(&mut self) {
        self.attempts = self.max_attempts;
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

enum OutboundCommand {
    Send(Value),
    Close,
}

enum SessionEnd {
    Deliberate,
    Remote,
}

struct ChannelShared {
    state: Mutex<ConnectionState>,
    attempts: AtomicU32,
    deliberate_close: AtomicBool,
    worker_active: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<OutboundCommand>>>,
}

impl ChannelShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            attempts: AtomicU32::new(0),
            deliberate_close: AtomicBool::new(false),
            worker_active: AtomicBool::new(false),
            outbound: Mutex::new(None),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: ConnectionState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }

    fn store_outbound(&self, sender: mpsc::UnboundedSender<OutboundCommand>) {
        *self
            .outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sender);
    }

    fn clear_outbound(&self) {
        *self
            .outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    fn send_command(&self, command: OutboundCommand) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|sender| sender.send(command).is_ok())
    }
}

/// Reconnecting real-time connection that translates inbound envelopes into
/// bus topics, in wire order, with no coalescing.
pub struct LiveUpdateChannel {
    bus: EventBus,
    config: LiveConfig,
    shared: Arc<ChannelShared>,
}

impl LiveUpdateChannel {
    pub fn new(bus: EventBus, config: LiveConfig) -> Self {
        Self {
            bus,
            config,
            shared: Arc::new(ChannelShared::new()),
        }
    }

    /// Opens the connection with the given bearer credential and keeps it
    /// alive with bounded-backoff reconnects until disconnected or exhausted.
    pub fn connect(&self, credential: &str) -> LiveResult<()> {
        ensure!(
            !credential.trim().is_empty(),
            MissingCredentialSnafu {
                stage: "live-connect",
            }
        );

        if self.shared.worker_active.swap(true, Ordering::SeqCst) {
            tracing::warn!("live channel connect ignored, a connection worker is already running");
            return Ok(());
        }

        let endpoint = format!(
            "{}/ws/{}",
            self.config.ws_url.trim_end_matches('/'),
            credential.trim()
        );
        if let Err(source) = url::Url::parse(&endpoint) {
            self.shared.worker_active.store(false, Ordering::SeqCst);
            return Err(source).context(InvalidUrlSnafu {
                stage: "live-connect",
                url: endpoint,
            });
        }

        self.shared.deliberate_close.store(false, Ordering::SeqCst);
        self.shared.attempts.store(0, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connecting);

        let bus = self.bus.clone();
        let config = self.config.clone();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            run_connection_loop(bus, config, shared.clone(), endpoint).await;
            shared.worker_active.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    /// Deliberate shutdown; exhausts the reconnect budget so no further
    /// attempts fire until `connect` is called again.
    pub fn disconnect(&self) {
        tracing::info!("live channel disconnect requested");
        self.shared.deliberate_close.store(true, Ordering::SeqCst);
        self.shared
            .attempts
            .store(self.config.max_reconnect_attempts, Ordering::SeqCst);
        self.shared.send_command(OutboundCommand::Close);
    }

    /// Queues a payload for the wire; a no-op returning `false` when the
    /// channel is not connected.
    pub fn send(&self, payload: Value) -> bool {
        if self.shared.state() != ConnectionState::Connected {
            return false;
        }
        self.shared.send_command(OutboundCommand::Send(payload))
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.shared.state(),
            reconnect_attempts: self.shared.attempts.load(Ordering::SeqCst),
            max_reconnect_attempts: self.config.max_reconnect_attempts,
        }
    }
}

async fn run_connection_loop(
    bus: EventBus,
    config: LiveConfig,
    shared: Arc<ChannelShared>,
    endpoint: String,
) {
    let mut policy = ReconnectPolicy::new(config.reconnect_base, config.max_reconnect_attempts);

    loop {
        shared.set_state(ConnectionState::Connecting);
        match connect_async(endpoint.as_str()).await {
            Ok((socket, _response)) => {
                // The outbound queue must exist before the state reads Connected.
                let (sender, receiver) = mpsc::unbounded_channel();
                shared.store_outbound(sender);
                policy.reset();
                shared.attempts.store(0, Ordering::SeqCst);
                shared.set_state(ConnectionState::Connected);
                tracing::info!("live channel connected");
                bus.emit(topics::WEBSOCKET_CONNECTED, Value::Null);

                let ended = run_session(&bus, &config, socket, receiver).await;

                shared.clear_outbound();
                shared.set_state(ConnectionState::Disconnected);
                tracing::info!("live channel disconnected");
                bus.emit(topics::WEBSOCKET_DISCONNECTED, Value::Null);

                if matches!(ended, SessionEnd::Deliberate) {
                    policy.exhaust();
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "live channel dial failed");
                shared.set_state(ConnectionState::Disconnected);
            }
        }

        if shared.deliberate_close.load(Ordering::SeqCst) {
            policy.exhaust();
        }

        let Some(delay) = policy.next_delay() else {
            if !shared.deliberate_close.load(Ordering::SeqCst) {
                tracing::warn!(
                    max_attempts = config.max_reconnect_attempts,
                    "live channel reconnect attempts exhausted"
                );
            }
            return;
        };

        shared.attempts.store(policy.attempts(), Ordering::SeqCst);
        tracing::info!(
            attempt = policy.attempts(),
            max_attempts = config.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling live channel reconnect"
        );
        tokio::time::sleep(delay).await;

        // A disconnect issued while waiting cancels the pending attempt.
        if shared.deliberate_close.load(Ordering::SeqCst) {
            return;
        }
    }
}

async fn run_session(
    bus: &EventBus,
    config: &LiveConfig,
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut receiver: mpsc::UnboundedReceiver<OutboundCommand>,
) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();

    let mut heartbeat = tokio::time::interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );

    loop {
        tokio::select! {
            command = receiver.recv() => match command {
                Some(OutboundCommand::Send(payload)) => {
                    if let Err(error) = sink.send(WsFrame::Text(payload.to_string())).await {
                        tracing::warn!(error = %error, "live channel send failed");
                        return SessionEnd::Remote;
                    }
                }
                Some(OutboundCommand::Close) | None => {
                    let _ = sink.send(WsFrame::Close(None)).await;
                    return SessionEnd::Deliberate;
                }
            },
            _ = heartbeat.tick() => {
                let ping = serde_json::json!({ "type": "ping" });
                if let Err(error) = sink.send(WsFrame::Text(ping.to_string())).await {
                    tracing::warn!(error = %error, "live channel keep-alive failed");
                    return SessionEnd::Remote;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(WsFrame::Text(text))) => dispatch_frame(bus, &text),
                Some(Ok(WsFrame::Close(_))) | None => return SessionEnd::Remote,
                Some(Ok(_)) => {} // binary and control frames carry no envelopes
                Some(Err(error)) => {
                    tracing::warn!(error = %error, "live channel stream error");
                    return SessionEnd::Remote;
                }
            }
        }
    }
}

fn dispatch_frame(bus: &EventBus, raw: &str) {
    match envelope::translate(raw) {
        Translation::Emit(topic, payload) => bus.emit(topic, payload),
        Translation::Absorb(kind) => {
            tracing::debug!(kind, "absorbed live channel echo");
        }
        Translation::Unknown(kind) => {
            tracing::debug!(kind = %kind, "dropping unknown live envelope type");
        }
        Translation::Malformed(details) => {
            tracing::warn!(details = %details, "dropping malformed live frame");
        }
    }
}
