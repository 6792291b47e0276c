//! Notification reconciler.
//!
//! Owns the local notification feed and the derived unread counter, and
//! keeps both consistent across two independently-updating inputs: push
//! frames and REST fetches. Push deltas are applied optimistically; the
//! periodic authoritative re-fetch of the unread count is the
//! correctness backstop for anything the push channel dropped.
//!
//! The feed and counter are private; readers go through
//! [`NotificationReconciler::notifications`] and
//! [`NotificationReconciler::unread_count`], so no other module can
//! mutate them out from under the reconciler.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use lancer_core::notification::Notification;
use lancer_core::types::DbId;
use lancer_events::bus::EventBus;
use lancer_events::protocol::{Channel, PushFrame, ServerEvent};
use lancer_events::sequence::{SeqCheck, SequenceTracker};

use crate::api::{ApiError, MarketplaceApi, NotificationFilters};
use crate::optimistic::OptimisticUpdate;

/// How often the authoritative unread count is re-fetched.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Tuning for the background reconciliation task.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub reconcile_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }
}

/// The reconciler's private state slice. Updated atomically per
/// operation; a reader never observes a half-applied change.
#[derive(Debug, Default)]
struct FeedState {
    /// Most-recent-first.
    items: Vec<Notification>,
    unread_count: u64,
}

/// Merges push-delivered notification events with polled snapshots.
pub struct NotificationReconciler<A: ?Sized> {
    api: Arc<A>,
    state: Mutex<FeedState>,
}

impl<A: MarketplaceApi + ?Sized> NotificationReconciler<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            state: Mutex::new(FeedState::default()),
        }
    }

    // -----------------------------------------------------------------------
    // Read API
    // -----------------------------------------------------------------------

    /// Current feed, most recent first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().items.clone()
    }

    /// Derived unread counter. Matches `count(read == false)` whenever
    /// the feed itself is in sync; the periodic reconciliation corrects
    /// any drift from missed pushes.
    pub fn unread_count(&self) -> u64 {
        self.lock().unread_count
    }

    // -----------------------------------------------------------------------
    // Push path
    // -----------------------------------------------------------------------

    /// Fold one push-delivered notification into the feed.
    ///
    /// Duplicate delivery (an id already present) is a no-op.
    pub fn apply_push(&self, notification: Notification) {
        let mut state = self.lock();
        if state.items.iter().any(|n| n.id == notification.id) {
            tracing::debug!(id = notification.id, "Duplicate notification push ignored");
            return;
        }
        if !notification.read {
            state.unread_count += 1;
        }
        state.items.insert(0, notification);
    }

    // -----------------------------------------------------------------------
    // User actions (optimistic)
    // -----------------------------------------------------------------------

    /// Mark one notification read.
    ///
    /// The flip and the counter decrement are applied locally first and
    /// reverted if the server rejects. The counter only ever moves by
    /// the number of items actually transitioned, and never below zero.
    /// Rollback re-locates the item by id, so pushes folded in while
    /// the request was in flight are untouched.
    pub async fn mark_read(&self, id: DbId) -> Result<(), ApiError> {
        let update = {
            let mut state = self.lock();
            let Some(item) = state.items.iter().position(|n| n.id == id && !n.read) else {
                // Unknown or already read: nothing to transition.
                return Ok(());
            };
            OptimisticUpdate::begin(&mut *state, move |s| {
                s.items[item].read = true;
                s.unread_count = s.unread_count.saturating_sub(1);
                move |s: &mut FeedState| {
                    if let Some(n) = s.items.iter_mut().find(|n| n.id == id) {
                        if n.read {
                            n.read = false;
                            s.unread_count += 1;
                        }
                    }
                }
            })
        };

        match self.api.mark_notification_read(id).await {
            Ok(()) => {
                update.confirm();
                Ok(())
            }
            Err(e) => {
                update.rollback(&mut self.lock());
                Err(e)
            }
        }
    }

    /// Delete one notification, optimistically.
    pub async fn delete(&self, id: DbId) -> Result<(), ApiError> {
        let update = {
            let mut state = self.lock();
            let Some(pos) = state.items.iter().position(|n| n.id == id) else {
                return Ok(());
            };
            OptimisticUpdate::begin(&mut *state, move |s| {
                let removed = s.items.remove(pos);
                if !removed.read {
                    s.unread_count = s.unread_count.saturating_sub(1);
                }
                move |s: &mut FeedState| {
                    // Redelivered by push meanwhile: nothing to restore.
                    if s.items.iter().any(|n| n.id == removed.id) {
                        return;
                    }
                    if !removed.read {
                        s.unread_count += 1;
                    }
                    let at = pos.min(s.items.len());
                    s.items.insert(at, removed);
                }
            })
        };

        match self.api.delete_notification(id).await {
            Ok(()) => {
                update.confirm();
                Ok(())
            }
            Err(e) => {
                update.rollback(&mut self.lock());
                Err(e)
            }
        }
    }

    /// Mark the whole feed read as one unit: confirmed or rolled back
    /// wholesale, never partially. The rollback restores exactly the
    /// items this call flipped.
    pub async fn mark_all_read(&self) -> Result<u64, ApiError> {
        let update = {
            let mut state = self.lock();
            OptimisticUpdate::begin(&mut *state, |s| {
                let flipped: Vec<DbId> = s
                    .items
                    .iter_mut()
                    .filter(|n| !n.read)
                    .map(|n| {
                        n.read = true;
                        n.id
                    })
                    .collect();
                s.unread_count = s.unread_count.saturating_sub(flipped.len() as u64);
                move |s: &mut FeedState| {
                    for id in flipped {
                        if let Some(n) = s.items.iter_mut().find(|n| n.id == id) {
                            if n.read {
                                n.read = false;
                                s.unread_count += 1;
                            }
                        }
                    }
                }
            })
        };

        match self.api.mark_all_read().await {
            Ok(count) => {
                update.confirm();
                Ok(count)
            }
            Err(e) => {
                update.rollback(&mut self.lock());
                Err(e)
            }
        }
    }

    /// Delete all read notifications as one unit.
    pub async fn delete_all_read(&self) -> Result<u64, ApiError> {
        let update = {
            let mut state = self.lock();
            OptimisticUpdate::begin(&mut *state, |s| {
                let mut removed = Vec::new();
                let mut i = 0;
                while i < s.items.len() {
                    if s.items[i].read {
                        removed.push((i, s.items.remove(i)));
                    } else {
                        i += 1;
                    }
                }
                move |s: &mut FeedState| {
                    for (pos, item) in removed {
                        if s.items.iter().any(|n| n.id == item.id) {
                            continue;
                        }
                        let at = pos.min(s.items.len());
                        s.items.insert(at, item);
                    }
                }
            })
        };

        match self.api.delete_all_read().await {
            Ok(count) => {
                update.confirm();
                Ok(count)
            }
            Err(e) => {
                update.rollback(&mut self.lock());
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reconciliation (REST path)
    // -----------------------------------------------------------------------

    /// Replace the local unread counter with the server's value.
    ///
    /// This is the backstop for missed pushes: eventual, not immediate,
    /// consistency.
    pub async fn reconcile_unread(&self) -> Result<(), ApiError> {
        let count = self.api.unread_count().await?;
        let mut state = self.lock();
        if state.unread_count != count {
            tracing::debug!(
                local = state.unread_count,
                server = count,
                "Unread count drifted, replacing with server value"
            );
        }
        state.unread_count = count;
        Ok(())
    }

    /// Full re-fetch of feed and counter, replacing local state.
    ///
    /// Used when the push channel reports a gap or lag and deltas can
    /// no longer be trusted.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let items = self
            .api
            .get_notifications(&NotificationFilters::default())
            .await?;
        let count = self.api.unread_count().await?;
        let mut state = self.lock();
        state.items = items;
        state.unread_count = count;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Background task
    // -----------------------------------------------------------------------

    /// Long-lived task: fold push frames into the feed and run the
    /// periodic reconciliation backstop.
    ///
    /// Fetch failures during background reconciliation are logged and
    /// retried on the next tick, never surfaced to the user from here.
    pub async fn run(
        self: Arc<Self>,
        config: ReconcilerConfig,
        bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) {
        let mut frames = bus.subscribe();
        let mut tracker = SequenceTracker::new();
        let mut ticker = tokio::time::interval(config.reconcile_interval);
        // The immediate first tick doubles as the initial fetch.
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_unread().await {
                        tracing::warn!(error = %e, "Unread reconciliation failed, will retry");
                    }
                }
                frame = frames.recv() => match frame {
                    Ok(frame) => self.handle_frame(&mut tracker, frame).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Notification feed lagged, re-fetching");
                        if let Err(e) = self.refresh().await {
                            tracing::warn!(error = %e, "Feed refresh after lag failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    async fn handle_frame(&self, tracker: &mut SequenceTracker, frame: PushFrame) {
        let ServerEvent::NewNotification { notification } = frame.event else {
            return;
        };
        match tracker.observe(Channel::Notifications, frame.seq) {
            SeqCheck::Apply => self.apply_push(notification),
            SeqCheck::Duplicate => {}
            SeqCheck::Refresh => {
                if let Err(e) = self.refresh().await {
                    tracing::warn!(error = %e, "Feed refresh after gap failed");
                    // Apply the delta anyway; the next reconcile tick
                    // corrects the counter.
                    self.apply_push(notification);
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
