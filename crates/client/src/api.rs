//! REST collaborator interface.
//!
//! All durable state lives behind these operations; this core consumes
//! them and never persists anything itself. [`MarketplaceApi`] is the
//! seam the reconcilers are written against, with [`HttpApi`]
//! (crate::http) as the production binding and in-memory fakes in
//! tests.

use async_trait::async_trait;

use lancer_core::conversation::{Conversation, Message};
use lancer_core::job::{Job, JobStatus};
use lancer_core::ledger::Submission;
use lancer_core::lifecycle::TransitionAction;
use lancer_core::notification::{Notification, NotificationKind};
use lancer_core::types::DbId;
use lancer_core::upload::UploadedFile;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by the REST collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network / timeout failure. Recoverable by retry; optimistic
    /// local state is rolled back when the caller does not retry.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The payload failed the server's contract. Not retryable as-is.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The server's state no longer matches what the client assumed.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A non-conflict server-side failure (5xx).
    #[error("Server error: {0}")]
    Server(String),
}

impl ApiError {
    /// Whether a plain retry of the same request can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Server(_))
    }
}

/// Failure of a job action, after conflict resolution.
#[derive(Debug, thiserror::Error)]
pub enum TransitionFailure {
    /// The job changed on the server. Carries the re-fetched job so the
    /// caller can re-present the decision against current state instead
    /// of silently forcing the stale view.
    #[error("Job {} is now '{}'; decision must be re-presented", latest.id, latest.status)]
    Stale { latest: Job },

    #[error(transparent)]
    Api(#[from] ApiError),
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Query filters for `get_notifications`.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilters {
    pub unread_only: bool,
    pub kind: Option<NotificationKind>,
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// The collaborator trait
// ---------------------------------------------------------------------------

/// The REST operations this core consumes.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Request a lifecycle transition. `expected` is the status the
    /// client believes the job is in; a mismatch on the server comes
    /// back as [`ApiError::Conflict`].
    async fn transition_job(
        &self,
        job_id: DbId,
        action: &TransitionAction,
        expected: JobStatus,
    ) -> Result<Job, ApiError>;

    async fn get_job(&self, job_id: DbId) -> Result<Job, ApiError>;

    /// The job's current submission, if any.
    async fn get_submission(&self, job_id: DbId) -> Result<Option<Submission>, ApiError>;

    async fn create_conversation(
        &self,
        other_user_id: DbId,
        job_id: Option<DbId>,
    ) -> Result<Conversation, ApiError>;

    /// Send a message; the returned [`Message`] is the authoritative
    /// record that replaces the caller's pending entry.
    async fn send_message(
        &self,
        conversation_id: DbId,
        content: &str,
        attachments: &[UploadedFile],
    ) -> Result<Message, ApiError>;

    /// Full message history for a conversation, server order.
    async fn get_messages(&self, conversation_id: DbId) -> Result<Vec<Message>, ApiError>;

    async fn get_notifications(
        &self,
        filters: &NotificationFilters,
    ) -> Result<Vec<Notification>, ApiError>;

    /// Authoritative unread-notification count for the current user.
    async fn unread_count(&self) -> Result<u64, ApiError>;

    async fn mark_notification_read(&self, id: DbId) -> Result<(), ApiError>;

    /// Mark everything read; returns the number marked.
    async fn mark_all_read(&self) -> Result<u64, ApiError>;

    async fn delete_notification(&self, id: DbId) -> Result<(), ApiError>;

    /// Delete all read notifications; returns the number deleted.
    async fn delete_all_read(&self) -> Result<u64, ApiError>;
}

// ---------------------------------------------------------------------------
// Conflict-aware transition helper
// ---------------------------------------------------------------------------

/// Attempt a transition; on a server conflict, re-fetch the job and hand
/// it back as [`TransitionFailure::Stale`] so the actor can decide
/// again with fresh state.
pub async fn transition_with_refresh<A: MarketplaceApi + ?Sized>(
    api: &A,
    job: &Job,
    action: &TransitionAction,
) -> Result<Job, TransitionFailure> {
    match api.transition_job(job.id, action, job.status).await {
        Ok(updated) => Ok(updated),
        Err(ApiError::Conflict(reason)) => {
            tracing::info!(job_id = job.id, %reason, "Transition conflicted, re-fetching job");
            let latest = api.get_job(job.id).await?;
            Err(TransitionFailure::Stale { latest })
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ApiError::Transport("timeout".into()).is_retryable());
        assert!(ApiError::Server("boom".into()).is_retryable());
        assert!(!ApiError::Validation("short".into()).is_retryable());
        assert!(!ApiError::Conflict("moved".into()).is_retryable());
    }
}
