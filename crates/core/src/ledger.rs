//! Append-only submission and revision-request ledger.
//!
//! Every recorded submission or revision request is immutable once
//! written; review outcomes are stamped onto the record
//! (`status`/`reviewed_at`) without rewriting its content. The ledger
//! is the source of truth for which submission is "current" and for the
//! displayed revision count.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};
use crate::upload::{validate_file_ref, UploadedFile};

/// Minimum length of a submission description.
pub const MIN_DESCRIPTION_LEN: usize = 20;

/// Review state of a recorded submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

/// A worker's delivered work product for a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub id: DbId,
    pub job_id: DbId,
    pub description: String,
    pub links: Vec<String>,
    pub files: Vec<UploadedFile>,
    pub status: SubmissionStatus,
    pub created_at: Timestamp,
    pub reviewed_at: Option<Timestamp>,
}

/// Company feedback that sends a submission back for rework.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevisionRequest {
    pub id: DbId,
    pub job_id: DbId,
    pub feedback: String,
    pub new_deadline: Timestamp,
    pub attachments: Vec<UploadedFile>,
    /// Ordinal of this request for the job, starting at 1.
    pub revision_count: u32,
    pub created_at: Timestamp,
}

/// Input for [`JobLedger::record_submission`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubmissionPayload {
    pub description: String,
    pub links: Vec<String>,
    pub files: Vec<UploadedFile>,
}

/// Input for [`JobLedger::record_revision_request`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevisionPayload {
    pub feedback: String,
    pub new_deadline: Timestamp,
    pub attachments: Vec<UploadedFile>,
}

/// Validate a submission payload. Uploads must already be complete.
pub fn validate_submission_payload(payload: &SubmissionPayload) -> Result<(), String> {
    if payload.description.trim().chars().count() < MIN_DESCRIPTION_LEN {
        return Err(format!(
            "Submission description must be at least {MIN_DESCRIPTION_LEN} characters"
        ));
    }
    for file in &payload.files {
        validate_file_ref(file)?;
    }
    Ok(())
}

/// Validate a revision-request payload against the current time.
pub fn validate_revision_payload(payload: &RevisionPayload, now: Timestamp) -> Result<(), String> {
    if payload.feedback.trim().is_empty() {
        return Err("Revision feedback must not be empty".to_string());
    }
    if payload.new_deadline <= now {
        return Err("Revision deadline must be in the future".to_string());
    }
    for file in &payload.attachments {
        validate_file_ref(file)?;
    }
    Ok(())
}

/// Append-only history of submissions and revision requests for one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobLedger {
    pub job_id: DbId,
    submissions: Vec<Submission>,
    revisions: Vec<RevisionRequest>,
    next_id: DbId,
}

impl JobLedger {
    pub fn new(job_id: DbId) -> Self {
        Self {
            job_id,
            submissions: Vec::new(),
            revisions: Vec::new(),
            next_id: 1,
        }
    }

    /// Record a new submission. The previous current submission (if any)
    /// is retained, never deleted.
    pub fn record_submission(
        &mut self,
        payload: SubmissionPayload,
        now: Timestamp,
    ) -> Result<&Submission, CoreError> {
        validate_submission_payload(&payload).map_err(CoreError::Validation)?;

        let submission = Submission {
            id: self.allocate_id(),
            job_id: self.job_id,
            description: payload.description,
            links: payload.links,
            files: payload.files,
            status: SubmissionStatus::Pending,
            created_at: now,
            reviewed_at: None,
        };
        self.submissions.push(submission);
        Ok(self.submissions.last().ok_or_else(|| {
            CoreError::Internal("submission vanished after append".to_string())
        })?)
    }

    /// Record a revision request and advance the revision index.
    ///
    /// The outgoing current submission is stamped `rejected`; the job's
    /// own status change is the lifecycle engine's concern.
    pub fn record_revision_request(
        &mut self,
        payload: RevisionPayload,
        now: Timestamp,
    ) -> Result<&RevisionRequest, CoreError> {
        validate_revision_payload(&payload, now).map_err(CoreError::Validation)?;

        self.review_current(SubmissionStatus::Rejected, now);

        let request = RevisionRequest {
            id: self.allocate_id(),
            job_id: self.job_id,
            feedback: payload.feedback,
            new_deadline: payload.new_deadline,
            attachments: payload.attachments,
            revision_count: self.revisions.len() as u32 + 1,
            created_at: now,
        };
        self.revisions.push(request);
        Ok(self.revisions.last().ok_or_else(|| {
            CoreError::Internal("revision request vanished after append".to_string())
        })?)
    }

    /// Stamp the current submission with a review outcome.
    ///
    /// No-op when there is no pending current submission.
    pub fn review_current(&mut self, status: SubmissionStatus, now: Timestamp) {
        if let Some(current) = self.current_submission_mut() {
            if current.status == SubmissionStatus::Pending {
                current.status = status;
                current.reviewed_at = Some(now);
            }
        }
    }

    /// The most recent submission, by `created_at` (ties resolve to the
    /// latest appended record).
    pub fn current_submission(&self) -> Option<&Submission> {
        self.submissions.iter().max_by_key(|s| s.created_at)
    }

    fn current_submission_mut(&mut self) -> Option<&mut Submission> {
        self.submissions.iter_mut().max_by_key(|s| s.created_at)
    }

    /// Number of revision requests recorded for this job. This is the
    /// figure shown to users; it is not an editable field.
    pub fn revision_count(&self) -> u32 {
        self.revisions.len() as u32
    }

    /// Full submission history, oldest first.
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    /// Full revision-request history, oldest first.
    pub fn revisions(&self) -> &[RevisionRequest] {
        &self.revisions
    }

    fn allocate_id(&mut self) -> DbId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
