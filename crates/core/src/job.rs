//! Job model and lifecycle vocabulary.
//!
//! A job is posted by a company, assigned to at most one worker, and
//! walks the status graph owned by [`lifecycle`](crate::lifecycle).
//! Nothing outside that module mutates `status`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{DbId, Timestamp};

/// Lifecycle states of a job assignment.
///
/// Serialized with the wire strings the REST collaborator uses
/// (`"in-progress"`, `"revision-requested"`, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Posted,
    Assigned,
    InProgress,
    Submitted,
    RevisionRequested,
    Completed,
    Cancelled,
}

impl JobStatus {
    /// Wire string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Posted => "posted",
            JobStatus::Assigned => "assigned",
            JobStatus::InProgress => "in-progress",
            JobStatus::Submitted => "submitted",
            JobStatus::RevisionRequested => "revision-requested",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// `true` once the job can never leave this status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions a caller can request against a job.
///
/// `Submit` covers both the first submission (from `in-progress`) and a
/// resubmission (from `revision-requested`); the ledger owns the
/// revision index, not the action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Assign,
    Start,
    Submit,
    Approve,
    RequestRevision,
    Cancel,
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Assign => "assign",
            JobAction::Start => "start",
            JobAction::Submit => "submit",
            JobAction::Approve => "approve",
            JobAction::RequestRevision => "request_revision",
            JobAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of the actor requesting a transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Worker,
    Company,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Worker => "worker",
            ActorRole::Company => "company",
            ActorRole::Admin => "admin",
        }
    }
}

/// A unit of work posted by a company.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: DbId,
    /// Owning company.
    pub company_id: DbId,
    /// Assigned worker, set at the `posted -> assigned` transition.
    pub worker_id: Option<DbId>,
    pub status: JobStatus,
    pub deadline: Option<Timestamp>,
    /// Set exactly once, when the job is assigned.
    pub assigned_date: Option<Timestamp>,
    /// Set when the company approves the final submission.
    pub completed_date: Option<Timestamp>,
}

impl Job {
    /// A freshly posted, unassigned job.
    pub fn posted(id: DbId, company_id: DbId, deadline: Option<Timestamp>) -> Self {
        Self {
            id,
            company_id,
            worker_id: None,
            status: JobStatus::Posted,
            deadline,
            assigned_date: None,
            completed_date: None,
        }
    }
}
