//! Long-lived push connection manager.
//!
//! Owns one WebSocket per authenticated session. Reconnects with capped
//! exponential backoff, queues subscribe/unsubscribe while disconnected,
//! and replays the desired subscription set on every (re)connect.
//! Decoded frames are published to the [`EventBus`](crate::bus::EventBus)
//! for local consumers.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use lancer_core::types::DbId;

use crate::bus::EventBus;
use crate::protocol::{ClientEvent, PushFrame};

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Lifecycle of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Capped exponential backoff with jitter for reconnect attempts.
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    /// Default initial delay between reconnect attempts.
    pub const DEFAULT_INITIAL: Duration = Duration::from_secs(1);

    /// Default backoff cap.
    pub const DEFAULT_MAX: Duration = Duration::from_secs(30);

    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
        }
    }

    /// Delay before the next attempt: `initial * 2^attempt`, capped,
    /// plus up to 25% jitter to avoid synchronized reconnect storms.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self
            .initial
            .saturating_mul(1u32 << self.attempt.min(16))
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);

        let jitter_ms = exp.as_millis() as u64 / 4;
        if jitter_ms == 0 {
            return exp;
        }
        exp + Duration::from_millis(rand::random_range(0..=jitter_ms))
    }

    /// Base delay without jitter, for inspection and tests.
    pub fn base_delay(&self) -> Duration {
        self.initial
            .saturating_mul(1u32 << self.attempt.min(16))
            .min(self.max)
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INITIAL, Self::DEFAULT_MAX)
    }
}

// ---------------------------------------------------------------------------
// Subscription set
// ---------------------------------------------------------------------------

/// The conversations this session wants to be joined to.
///
/// This is the desired state, independent of the socket: joins and
/// leaves issued while disconnected simply edit the set, and the whole
/// set is replayed as `join_conversation` events on every (re)connect.
/// The notification feed needs no explicit join; it follows the session.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    conversations: BTreeSet<DbId>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a conversation. Returns `true` if it was not already present.
    pub fn join(&mut self, conversation_id: DbId) -> bool {
        self.conversations.insert(conversation_id)
    }

    /// Remove a conversation. Returns `true` if it was present.
    pub fn leave(&mut self, conversation_id: DbId) -> bool {
        self.conversations.remove(&conversation_id)
    }

    pub fn contains(&self, conversation_id: DbId) -> bool {
        self.conversations.contains(&conversation_id)
    }

    /// Join events for every desired conversation, for reconnect replay.
    pub fn replay_events(&self) -> Vec<ClientEvent> {
        self.conversations
            .iter()
            .map(|&conversation_id| ClientEvent::JoinConversation { conversation_id })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint, e.g. `wss://api.example.com/ws?token=...`.
    pub url: String,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff_initial: Backoff::DEFAULT_INITIAL,
            backoff_max: Backoff::DEFAULT_MAX,
        }
    }
}

struct Shared {
    state: ConnectionState,
    subscriptions: SubscriptionSet,
}

/// Caller-facing handle to the running connection.
///
/// Cheap to clone; all methods are non-blocking. Events sent while
/// disconnected are held in the outbound queue and flushed after the
/// subscription replay on reconnect.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Mutex<Shared>>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Subscribe to a conversation's channel.
    pub fn join_conversation(&self, conversation_id: DbId) {
        let newly_added = self.lock().subscriptions.join(conversation_id);
        if newly_added {
            // If disconnected this sits in the queue; replay on
            // reconnect re-sends it anyway and the server treats a
            // duplicate join as a no-op.
            let _ = self
                .outbound
                .send(ClientEvent::JoinConversation { conversation_id });
        }
    }

    /// Unsubscribe from a conversation's channel.
    pub fn leave_conversation(&self, conversation_id: DbId) {
        let was_present = self.lock().subscriptions.leave(conversation_id);
        if was_present {
            let _ = self
                .outbound
                .send(ClientEvent::LeaveConversation { conversation_id });
        }
    }

    pub fn is_subscribed(&self, conversation_id: DbId) -> bool {
        self.lock().subscriptions.contains(conversation_id)
    }

    /// Emit an event (message send, typing signal) to the server.
    pub fn send(&self, event: ClientEvent) {
        let _ = self.outbound.send(event);
    }

    /// Stop the connection task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        // A poisoned lock means a panic elsewhere; propagate the panic.
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drives the push connection: connect, replay subscriptions, pump
/// frames, reconnect with backoff on drop.
pub struct ConnectionManager {
    config: ConnectionConfig,
    bus: Arc<EventBus>,
    shared: Arc<Mutex<Shared>>,
    outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Build a manager and its caller-facing handle.
    pub fn new(config: ConnectionConfig, bus: Arc<EventBus>) -> (Self, ConnectionHandle) {
        let shared = Arc::new(Mutex::new(Shared {
            state: ConnectionState::Disconnected,
            subscriptions: SubscriptionSet::new(),
        }));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let handle = ConnectionHandle {
            shared: Arc::clone(&shared),
            outbound: outbound_tx,
            cancel: cancel.clone(),
        };
        let manager = Self {
            config,
            bus,
            shared,
            outbound_rx,
            cancel,
        };
        (manager, handle)
    }

    /// Run until [`ConnectionHandle::shutdown`] is called.
    ///
    /// Never returns an error: connection failures degrade to a backoff
    /// wait and another attempt.
    pub async fn run(mut self) {
        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);
        let mut first_attempt = true;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(if first_attempt {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });
            first_attempt = false;

            tracing::info!(url = %self.config.url, "Connecting to push channel");
            match connect_async(&self.config.url).await {
                Ok((ws_stream, _response)) => {
                    tracing::info!("Push channel connected");
                    self.set_state(ConnectionState::Connected);
                    backoff.reset();
                    let replay = self.lock().subscriptions.replay_events();
                    run_session(
                        ws_stream,
                        replay,
                        &self.bus,
                        &mut self.outbound_rx,
                        &self.cancel,
                    )
                    .await;
                    self.set_state(ConnectionState::Disconnected);
                    tracing::warn!("Push channel session ended");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Push channel connection failed");
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
            let delay = backoff.next_delay();
            tracing::debug!(delay_ms = delay.as_millis() as u64, "Backing off before reconnect");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => break,
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        self.lock().state = state;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drive one socket session until it drops or we shut down.
///
/// The desired subscription set is replayed before any queued traffic so
/// the server re-joins us to every conversation we care about.
async fn run_session(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    replay: Vec<ClientEvent>,
    bus: &EventBus,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    cancel: &CancellationToken,
) {
    let (mut sink, mut stream) = ws_stream.split();

    for event in replay {
        if send_event(&mut sink, &event).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(event) => {
                        if send_event(&mut sink, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => publish_frame(bus, &text),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Server closed push channel");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary / Frame — ignore.
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Push channel receive error");
                        break;
                    }
                    None => {
                        tracing::info!("Push channel stream exhausted");
                        break;
                    }
                }
            }
        }
    }
}

/// Decode one incoming text frame and publish it locally.
///
/// Malformed frames are logged and dropped; one bad frame must not take
/// the session down.
fn publish_frame(bus: &EventBus, text: &str) {
    match serde_json::from_str::<PushFrame>(text) {
        Ok(frame) => bus.publish(frame),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring undecodable push frame");
        }
    }
}

async fn send_event<S>(sink: &mut S, event: &ClientEvent) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode client event");
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await.map_err(|e| {
        tracing::error!(error = %e, "Push channel send failed");
    })
}
