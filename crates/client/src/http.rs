//! HTTP binding of [`MarketplaceApi`].
//!
//! Thin reqwest wrapper over the marketplace REST endpoints. Successful
//! responses arrive in a `{"data": ...}` envelope; error statuses are
//! classified into the [`ApiError`] taxonomy so callers can distinguish
//! retryable transport failures from contract violations and conflicts.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use lancer_core::conversation::{Conversation, Message};
use lancer_core::job::{Job, JobStatus};
use lancer_core::ledger::Submission;
use lancer_core::lifecycle::TransitionAction;
use lancer_core::notification::Notification;
use lancer_core::types::DbId;
use lancer_core::upload::UploadedFile;

use crate::api::{ApiError, MarketplaceApi, NotificationFilters};

/// HTTP request timeout for a single attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Connection settings for the REST collaborator.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL without a trailing slash, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Bearer token for the authenticated user.
    pub auth_token: String,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
        }
    }

    /// Load settings from the environment (`LANCER_API_URL`,
    /// `LANCER_API_TOKEN`), reading a `.env` file if present.
    pub fn from_env() -> Result<Self, ApiError> {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("LANCER_API_URL")
            .map_err(|_| ApiError::Validation("LANCER_API_URL is not set".to_string()))?;
        let auth_token = std::env::var("LANCER_API_TOKEN")
            .map_err(|_| ApiError::Validation("LANCER_API_TOKEN is not set".to_string()))?;
        Ok(Self::new(base_url, auth_token))
    }
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct CountPayload {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Production [`MarketplaceApi`] over HTTP.
pub struct HttpApi {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpApi {
    pub fn new(config: HttpConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.config.auth_token)
    }

    /// Send a request and decode the `data` envelope, classifying error
    /// statuses into [`ApiError`].
    async fn execute<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let envelope: Envelope<T> = response
                .json()
                .await
                .map_err(|e| ApiError::Server(format!("malformed response body: {e}")))?;
            return Ok(envelope.data);
        }

        let message = match response.json::<ErrorPayload>().await {
            Ok(payload) => payload.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        Err(classify_status(status, message))
    }
}

fn classify_status(status: reqwest::StatusCode, message: String) -> ApiError {
    use reqwest::StatusCode;
    match status {
        StatusCode::CONFLICT => ApiError::Conflict(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        // Timeout and throttling are transient; retry can succeed.
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            ApiError::Transport(message)
        }
        s if s.is_server_error() => ApiError::Server(message),
        _ => ApiError::Validation(message),
    }
}

#[async_trait]
impl MarketplaceApi for HttpApi {
    async fn transition_job(
        &self,
        job_id: DbId,
        action: &TransitionAction,
        expected: JobStatus,
    ) -> Result<Job, ApiError> {
        let body = serde_json::json!({
            "action": action,
            "expectedStatus": expected,
        });
        self.execute(
            self.client
                .post(self.url(&format!("/jobs/{job_id}/transition")))
                .json(&body),
        )
        .await
    }

    async fn get_job(&self, job_id: DbId) -> Result<Job, ApiError> {
        self.execute(self.client.get(self.url(&format!("/jobs/{job_id}"))))
            .await
    }

    async fn get_submission(&self, job_id: DbId) -> Result<Option<Submission>, ApiError> {
        match self
            .execute(self.client.get(self.url(&format!("/jobs/{job_id}/submission"))))
            .await
        {
            Ok(submission) => Ok(Some(submission)),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_conversation(
        &self,
        other_user_id: DbId,
        job_id: Option<DbId>,
    ) -> Result<Conversation, ApiError> {
        let body = serde_json::json!({
            "otherUserId": other_user_id,
            "jobId": job_id,
        });
        self.execute(self.client.post(self.url("/conversations")).json(&body))
            .await
    }

    async fn send_message(
        &self,
        conversation_id: DbId,
        content: &str,
        attachments: &[UploadedFile],
    ) -> Result<Message, ApiError> {
        let body = serde_json::json!({
            "content": content,
            "attachments": attachments,
        });
        self.execute(
            self.client
                .post(self.url(&format!("/conversations/{conversation_id}/messages")))
                .json(&body),
        )
        .await
    }

    async fn get_messages(&self, conversation_id: DbId) -> Result<Vec<Message>, ApiError> {
        self.execute(
            self.client
                .get(self.url(&format!("/conversations/{conversation_id}/messages"))),
        )
        .await
    }

    async fn get_notifications(
        &self,
        filters: &NotificationFilters,
    ) -> Result<Vec<Notification>, ApiError> {
        let mut request = self.client.get(self.url("/notifications"));
        if filters.unread_only {
            request = request.query(&[("unreadOnly", "true")]);
        }
        if let Some(kind) = filters.kind {
            request = request.query(&[("type", kind.as_str())]);
        }
        if let Some(limit) = filters.limit {
            request = request.query(&[("limit", limit.to_string())]);
        }
        self.execute(request).await
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        let payload: CountPayload = self
            .execute(self.client.get(self.url("/notifications/unread-count")))
            .await?;
        Ok(payload.count)
    }

    async fn mark_notification_read(&self, id: DbId) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .execute(self.client.post(self.url(&format!("/notifications/{id}/read"))))
            .await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<u64, ApiError> {
        let payload: CountPayload = self
            .execute(self.client.post(self.url("/notifications/read-all")))
            .await?;
        Ok(payload.count)
    }

    async fn delete_notification(&self, id: DbId) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .execute(self.client.delete(self.url(&format!("/notifications/{id}"))))
            .await?;
        Ok(())
    }

    async fn delete_all_read(&self) -> Result<u64, ApiError> {
        let payload: CountPayload = self
            .execute(self.client.delete(self.url("/notifications/read")))
            .await?;
        Ok(payload.count)
    }
}
