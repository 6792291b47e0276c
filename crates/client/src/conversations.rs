//! Conversation and message synchronizer.
//!
//! Keeps per-conversation message lists and the conversation list
//! consistent across optimistic sends, REST acks, and push-delivered
//! messages. Messages are appended in arrival order — the push channel
//! guarantees per-conversation ordering — and displayed sorted by
//! `created_at` ascending as a tiebreak only. A failed send is marked
//! failed and kept visible for resend, never dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lancer_core::conversation::{Conversation, Message};
use lancer_core::types::{DbId, Timestamp};
use lancer_core::upload::UploadedFile;
use lancer_events::bus::EventBus;
use lancer_events::protocol::{Channel, ClientEvent, PushFrame, ServerEvent};
use lancer_events::sequence::{SeqCheck, SequenceTracker};

use crate::api::{ApiError, MarketplaceApi};
use crate::optimistic::OptimisticUpdate;

// ---------------------------------------------------------------------------
// Chat entries
// ---------------------------------------------------------------------------

/// A message the local user sent that the server has not acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    /// Client-generated temporary id; the server ack is matched against
    /// this, never against content.
    pub client_ref: String,
    pub conversation_id: DbId,
    pub content: String,
    pub attachments: Vec<UploadedFile>,
    pub queued_at: Timestamp,
    /// Set when the send failed; the entry stays visible for resend.
    pub failed: bool,
}

/// One visible entry in a conversation: either a server-acknowledged
/// message or a local pending one.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEntry {
    Delivered(Message),
    Pending(PendingMessage),
}

impl ChatEntry {
    /// Display-order key: server `created_at` for delivered messages,
    /// local queue time for pending ones.
    fn sort_key(&self) -> Timestamp {
        match self {
            ChatEntry::Delivered(m) => m.created_at,
            ChatEntry::Pending(p) => p.queued_at,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ChatEntry::Pending(p) if p.failed)
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ChatState {
    /// Unordered; [`ConversationSync::conversations`] sorts on read.
    conversations: Vec<Conversation>,
    /// Arrival-order entries per conversation.
    messages: HashMap<DbId, Vec<ChatEntry>>,
    /// Conversations where the other participant is currently typing.
    typing: HashMap<DbId, bool>,
}

/// Per-session message synchronizer over the REST and push channels.
pub struct ConversationSync<A: ?Sized> {
    api: Arc<A>,
    state: Mutex<ChatState>,
}

impl<A: MarketplaceApi + ?Sized> ConversationSync<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            state: Mutex::new(ChatState::default()),
        }
    }

    // -----------------------------------------------------------------------
    // Read API
    // -----------------------------------------------------------------------

    /// Conversations ordered by `last_message_at` descending, so a
    /// freshly active conversation sits on top.
    pub fn conversations(&self) -> Vec<Conversation> {
        let mut list = self.lock().conversations.clone();
        list.sort_by_key(|c| std::cmp::Reverse(c.last_message_at.unwrap_or(c.created_at)));
        list
    }

    /// Entries for one conversation in display order: `created_at`
    /// ascending (stable, so equal timestamps keep arrival order), with
    /// unacked pending entries at their queue position.
    pub fn messages(&self, conversation_id: DbId) -> Vec<ChatEntry> {
        let mut entries = self
            .lock()
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();
        entries.sort_by_key(ChatEntry::sort_key);
        entries
    }

    /// Whether the other participant is typing. Soft signal only.
    pub fn is_typing(&self, conversation_id: DbId) -> bool {
        self.lock().typing.get(&conversation_id).copied().unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Conversation management
    // -----------------------------------------------------------------------

    /// Insert or update a conversation in the local list.
    pub fn upsert_conversation(&self, conversation: Conversation) {
        let mut state = self.lock();
        match state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation.id)
        {
            Some(existing) => *existing = conversation,
            None => state.conversations.push(conversation),
        }
    }

    /// Create (or fetch) the conversation with another user and load its
    /// history.
    pub async fn open_conversation(
        &self,
        other_user_id: DbId,
        job_id: Option<DbId>,
    ) -> Result<Conversation, ApiError> {
        let conversation = self.api.create_conversation(other_user_id, job_id).await?;
        self.upsert_conversation(conversation.clone());
        self.refresh(conversation.id).await?;
        Ok(conversation)
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Send a message with optimistic local append.
    ///
    /// The pending entry appears immediately; the server ack replaces it
    /// (matched by its client ref). On failure the entry is marked
    /// failed — kept for [`ConversationSync::resend`] — and the
    /// optimistic conversation-list bump is rolled back.
    pub async fn send(
        &self,
        conversation_id: DbId,
        content: &str,
        attachments: Vec<UploadedFile>,
    ) -> Result<Message, ApiError> {
        let client_ref = Uuid::new_v4().to_string();
        let queued_at = Utc::now();

        let bump = {
            let mut state = self.lock();
            let bump = OptimisticUpdate::begin(&mut state.conversations, move |convos| {
                let prior = convos
                    .iter_mut()
                    .find(|c| c.id == conversation_id)
                    .map(|c| std::mem::replace(&mut c.last_message_at, Some(queued_at)));
                move |convos: &mut Vec<Conversation>| {
                    let Some(prior) = prior else {
                        return;
                    };
                    if let Some(c) = convos.iter_mut().find(|c| c.id == conversation_id) {
                        // An incoming message re-bumped meanwhile; its
                        // timestamp wins over the undone send.
                        if c.last_message_at == Some(queued_at) {
                            c.last_message_at = prior;
                        }
                    }
                }
            });
            state
                .messages
                .entry(conversation_id)
                .or_default()
                .push(ChatEntry::Pending(PendingMessage {
                    client_ref: client_ref.clone(),
                    conversation_id,
                    content: content.to_string(),
                    attachments: attachments.clone(),
                    queued_at,
                    failed: false,
                }));
            bump
        };

        match self.api.send_message(conversation_id, content, &attachments).await {
            Ok(message) => {
                self.resolve_pending(conversation_id, &client_ref, message.clone());
                bump.confirm();
                Ok(message)
            }
            Err(e) => {
                let mut state = self.lock();
                mark_failed(&mut state, conversation_id, &client_ref);
                bump.rollback(&mut state.conversations);
                tracing::warn!(
                    conversation_id,
                    client_ref,
                    error = %e,
                    "Message send failed; entry kept for resend"
                );
                Err(e)
            }
        }
    }

    /// Retry a failed pending message, reusing its client ref.
    pub async fn resend(
        &self,
        conversation_id: DbId,
        client_ref: &str,
    ) -> Result<Message, ApiError> {
        let pending = {
            let state = self.lock();
            state
                .messages
                .get(&conversation_id)
                .and_then(|entries| {
                    entries.iter().find_map(|e| match e {
                        ChatEntry::Pending(p) if p.client_ref == client_ref => Some(p.clone()),
                        _ => None,
                    })
                })
                .ok_or_else(|| {
                    ApiError::NotFound(format!("no pending message with ref {client_ref}"))
                })?
        };

        match self
            .api
            .send_message(conversation_id, &pending.content, &pending.attachments)
            .await
        {
            Ok(message) => {
                self.resolve_pending(conversation_id, client_ref, message.clone());
                self.bump_conversation(conversation_id, message.created_at);
                Ok(message)
            }
            Err(e) => {
                mark_failed(&mut self.lock(), conversation_id, client_ref);
                Err(e)
            }
        }
    }

    /// Replace a pending entry with the authoritative message.
    ///
    /// If the same message already arrived over the push channel, the
    /// pending entry is simply removed — no duplicate by id.
    fn resolve_pending(&self, conversation_id: DbId, client_ref: &str, message: Message) {
        let mut state = self.lock();
        let entries = state.messages.entry(conversation_id).or_default();
        let already_delivered = entries
            .iter()
            .any(|e| matches!(e, ChatEntry::Delivered(m) if m.id == message.id));

        if let Some(pos) = entries.iter().position(
            |e| matches!(e, ChatEntry::Pending(p) if p.client_ref == client_ref),
        ) {
            if already_delivered {
                entries.remove(pos);
            } else {
                entries[pos] = ChatEntry::Delivered(message);
            }
        } else if !already_delivered {
            // The view closed and reopened meanwhile; the ack still
            // lands in the cached conversation state.
            entries.push(ChatEntry::Delivered(message));
        }
    }

    // -----------------------------------------------------------------------
    // Receiving
    // -----------------------------------------------------------------------

    /// Fold a push-delivered message into the conversation.
    ///
    /// Appended in arrival order; duplicates by id are dropped. The
    /// conversation moves to the top of the list, not just a preview
    /// update.
    pub fn apply_incoming(&self, conversation_id: DbId, message: Message) {
        {
            let mut state = self.lock();
            let entries = state.messages.entry(conversation_id).or_default();
            if entries
                .iter()
                .any(|e| matches!(e, ChatEntry::Delivered(m) if m.id == message.id))
            {
                tracing::debug!(id = message.id, "Duplicate message push ignored");
                return;
            }
            entries.push(ChatEntry::Delivered(message.clone()));
        }
        self.bump_conversation(conversation_id, message.created_at);
    }

    /// Full re-fetch of one conversation's history, replacing delivered
    /// entries wholesale while keeping unacked pending entries.
    pub async fn refresh(&self, conversation_id: DbId) -> Result<(), ApiError> {
        let fetched = self.api.get_messages(conversation_id).await?;
        let mut state = self.lock();
        let entries = state.messages.entry(conversation_id).or_default();
        let pending: Vec<ChatEntry> = entries
            .iter()
            .filter(|e| matches!(e, ChatEntry::Pending(_)))
            .cloned()
            .collect();
        *entries = fetched.into_iter().map(ChatEntry::Delivered).collect();
        entries.extend(pending);
        Ok(())
    }

    fn bump_conversation(&self, conversation_id: DbId, at: Timestamp) {
        let mut state = self.lock();
        if let Some(c) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            if c.last_message_at.map_or(true, |t| t < at) {
                c.last_message_at = Some(at);
            }
        }
    }

    fn set_typing(&self, conversation_id: DbId, typing: bool) {
        self.lock().typing.insert(conversation_id, typing);
    }

    // -----------------------------------------------------------------------
    // Background task
    // -----------------------------------------------------------------------

    /// Long-lived task folding push frames into conversation state.
    ///
    /// Per-conversation sequence gaps and local lag both degrade to a
    /// full re-fetch of the affected conversations.
    pub async fn run(self: Arc<Self>, bus: Arc<EventBus>, cancel: CancellationToken) {
        let mut frames = bus.subscribe();
        let mut tracker = SequenceTracker::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Ok(frame) => self.handle_frame(&mut tracker, frame).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Conversation feed lagged, re-fetching all");
                        let ids: Vec<DbId> = self.lock().messages.keys().copied().collect();
                        for id in ids {
                            if let Err(e) = self.refresh(id).await {
                                tracing::warn!(conversation_id = id, error = %e, "Refresh after lag failed");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    async fn handle_frame(&self, tracker: &mut SequenceTracker, frame: PushFrame) {
        match frame.event {
            ServerEvent::NewMessage {
                conversation_id,
                message,
            } => match tracker.observe(Channel::Conversation(conversation_id), frame.seq) {
                SeqCheck::Apply => self.apply_incoming(conversation_id, message),
                SeqCheck::Duplicate => {}
                SeqCheck::Refresh => {
                    if let Err(e) = self.refresh(conversation_id).await {
                        tracing::warn!(conversation_id, error = %e, "Refresh after gap failed");
                        self.apply_incoming(conversation_id, message);
                    }
                }
            },
            ServerEvent::UserTyping { conversation_id } => {
                self.set_typing(conversation_id, true);
            }
            ServerEvent::UserStopTyping { conversation_id } => {
                self.set_typing(conversation_id, false);
            }
            ServerEvent::NewNotification { .. } => {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn mark_failed(state: &mut ChatState, conversation_id: DbId, client_ref: &str) {
    if let Some(entries) = state.messages.get_mut(&conversation_id) {
        for entry in entries.iter_mut() {
            if let ChatEntry::Pending(p) = entry {
                if p.client_ref == client_ref {
                    p.failed = true;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Typing debounce
// ---------------------------------------------------------------------------

/// Idle window after the last keypress before `stop_typing` is sent.
pub const TYPING_IDLE: Duration = Duration::from_secs(1);

/// Trailing-edge debounce for the typing indicator.
///
/// Emits `typing` on the first keypress of a burst and `stop_typing`
/// once the keyboard has been idle for [`TYPING_IDLE`]. Both are soft
/// signals; the caller may drop them under load without affecting
/// message state.
#[derive(Debug)]
pub struct TypingDebouncer {
    conversation_id: DbId,
    idle: Duration,
    last_keypress: Option<Instant>,
    announced: bool,
}

impl TypingDebouncer {
    pub fn new(conversation_id: DbId) -> Self {
        Self::with_idle(conversation_id, TYPING_IDLE)
    }

    pub fn with_idle(conversation_id: DbId, idle: Duration) -> Self {
        Self {
            conversation_id,
            idle,
            last_keypress: None,
            announced: false,
        }
    }

    /// Register a keypress. Returns `typing` on the burst's leading edge.
    pub fn on_keypress(&mut self, now: Instant) -> Option<ClientEvent> {
        self.last_keypress = Some(now);
        if self.announced {
            return None;
        }
        self.announced = true;
        Some(ClientEvent::Typing {
            conversation_id: self.conversation_id,
        })
    }

    /// Poll the idle timer. Returns `stop_typing` once, after the idle
    /// window elapses with no further keypresses.
    pub fn on_tick(&mut self, now: Instant) -> Option<ClientEvent> {
        if !self.announced {
            return None;
        }
        let last = self.last_keypress?;
        if now.duration_since(last) < self.idle {
            return None;
        }
        self.announced = false;
        self.last_keypress = None;
        Some(ClientEvent::StopTyping {
            conversation_id: self.conversation_id,
        })
    }
}
