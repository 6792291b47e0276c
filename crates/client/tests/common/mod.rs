//! Shared in-memory [`MarketplaceApi`] fake for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use lancer_client::api::{ApiError, MarketplaceApi, NotificationFilters};
use lancer_core::conversation::{Conversation, Message};
use lancer_core::job::{Job, JobStatus};
use lancer_core::ledger::Submission;
use lancer_core::lifecycle::TransitionAction;
use lancer_core::notification::{Notification, NotificationKind};
use lancer_core::types::DbId;
use lancer_core::upload::UploadedFile;

/// Server-side state the fake owns. Tests mutate it directly to stage
/// scenarios (e.g. notifications created while the client was offline).
#[derive(Default)]
pub struct MockState {
    pub jobs: HashMap<DbId, Job>,
    pub notifications: Vec<Notification>,
    pub messages: HashMap<DbId, Vec<Message>>,
    pub next_message_id: DbId,
    pub fail_send_message: bool,
    pub fail_mark_read: bool,
    pub fail_mark_all: bool,
    pub fail_delete: bool,
    /// Hold `send_message` in flight before it resolves, to stage
    /// races with the push path.
    pub send_message_delay: Option<Duration>,
    /// Same for `mark_notification_read`.
    pub mark_read_delay: Option<Duration>,
}

pub struct MockApi {
    pub state: Mutex<MockState>,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_message_id: 1,
                ..MockState::default()
            }),
        }
    }

    pub fn with_state(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock().unwrap());
    }
}

pub fn notification(id: DbId, read: bool) -> Notification {
    Notification {
        id,
        user_id: 1,
        kind: NotificationKind::Job,
        title: format!("Notification {id}"),
        message: "body".to_string(),
        read,
        link: None,
        metadata: None,
        created_at: Utc::now(),
    }
}

pub fn message(id: DbId, conversation_id: DbId, content: &str) -> Message {
    Message {
        id,
        conversation_id,
        sender_id: 2,
        content: content.to_string(),
        attachments: Vec::new(),
        created_at: Utc::now(),
    }
}

pub fn conversation(id: DbId) -> Conversation {
    Conversation {
        id,
        participant_one_id: 1,
        participant_two_id: 2,
        job_id: None,
        last_message_at: None,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl MarketplaceApi for MockApi {
    async fn transition_job(
        &self,
        job_id: DbId,
        action: &TransitionAction,
        expected: JobStatus,
    ) -> Result<Job, ApiError> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;
        if job.status != expected {
            return Err(ApiError::Conflict(format!(
                "job is '{}', client assumed '{}'",
                job.status, expected
            )));
        }
        job.status = action.target();
        Ok(job.clone())
    }

    async fn get_job(&self, job_id: DbId) -> Result<Job, ApiError> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))
    }

    async fn get_submission(&self, _job_id: DbId) -> Result<Option<Submission>, ApiError> {
        Ok(None)
    }

    async fn create_conversation(
        &self,
        other_user_id: DbId,
        job_id: Option<DbId>,
    ) -> Result<Conversation, ApiError> {
        Ok(Conversation {
            id: 100 + other_user_id,
            participant_one_id: 1,
            participant_two_id: other_user_id,
            job_id,
            last_message_at: None,
            created_at: Utc::now(),
        })
    }

    async fn send_message(
        &self,
        conversation_id: DbId,
        content: &str,
        attachments: &[UploadedFile],
    ) -> Result<Message, ApiError> {
        let delay = self.state.lock().unwrap().send_message_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_send_message {
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        let id = state.next_message_id;
        state.next_message_id += 1;
        let message = Message {
            id,
            conversation_id,
            sender_id: 1,
            content: content.to_string(),
            attachments: attachments.to_vec(),
            created_at: Utc::now(),
        };
        state
            .messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn get_messages(&self, conversation_id: DbId) -> Result<Vec<Message>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_notifications(
        &self,
        filters: &NotificationFilters,
    ) -> Result<Vec<Notification>, ApiError> {
        let state = self.state.lock().unwrap();
        let mut items: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| !filters.unread_only || !n.read)
            .filter(|n| filters.kind.map_or(true, |k| n.kind == k))
            .cloned()
            .collect();
        if let Some(limit) = filters.limit {
            items.truncate(limit as usize);
        }
        Ok(items)
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|n| !n.read)
            .count() as u64)
    }

    async fn mark_notification_read(&self, id: DbId) -> Result<(), ApiError> {
        let delay = self.state.lock().unwrap().mark_read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_mark_read {
            return Err(ApiError::Server("write failed".to_string()));
        }
        match state.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                Ok(())
            }
            None => Err(ApiError::NotFound(format!("notification {id}"))),
        }
    }

    async fn mark_all_read(&self) -> Result<u64, ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_mark_all {
            return Err(ApiError::Server("write failed".to_string()));
        }
        let mut count = 0;
        for n in state.notifications.iter_mut().filter(|n| !n.read) {
            n.read = true;
            count += 1;
        }
        Ok(count)
    }

    async fn delete_notification(&self, id: DbId) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            return Err(ApiError::Server("write failed".to_string()));
        }
        state.notifications.retain(|n| n.id != id);
        Ok(())
    }

    async fn delete_all_read(&self) -> Result<u64, ApiError> {
        let mut state = self.state.lock().unwrap();
        let before = state.notifications.len();
        state.notifications.retain(|n| !n.read);
        Ok((before - state.notifications.len()) as u64)
    }
}
