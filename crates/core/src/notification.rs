//! Notification model.
//!
//! Notifications are created server-side on a triggering event,
//! delivered over the push channel and/or fetched via poll, and mutated
//! only by mark-read / delete. Navigation intent travels in the
//! structured [`NotificationAction`] metadata field; clients never
//! inspect `title` or `message` text to decide behaviour.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Category of a notification, used for filtering and icons.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Application,
    Job,
    Submission,
    Review,
    Message,
    System,
}

impl NotificationKind {
    /// The wire string, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Application => "application",
            NotificationKind::Job => "job",
            NotificationKind::Submission => "submission",
            NotificationKind::Review => "review",
            NotificationKind::Message => "message",
            NotificationKind::System => "system",
        }
    }
}

/// Structured navigation/action metadata attached to a notification.
///
/// Replaces the legacy practice of matching key phrases in
/// `title`/`message`. Legacy notifications carry no metadata and fall
/// back to the plain `link` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NotificationAction {
    /// Open a job's detail view.
    ViewJob { job_id: DbId },
    /// Open a job's submission for review.
    ReviewSubmission { job_id: DbId },
    /// Open a job with the revision feedback visible.
    ViewRevisionRequest { job_id: DbId },
    /// Open a conversation.
    OpenConversation { conversation_id: DbId },
}

/// A notification belonging to exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: DbId,
    pub user_id: DbId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    /// Optional deep link; the only navigation hint for legacy
    /// notifications without `metadata`.
    pub link: Option<String>,
    pub metadata: Option<NotificationAction>,
    pub created_at: Timestamp,
}

/// A notification the lifecycle engine wants created for a user.
///
/// Ids and timestamps are assigned server-side at insert time; this is
/// the pre-insert shape queued by a transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationDraft {
    pub user_id: DbId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: Option<NotificationAction>,
}
