//! Job lifecycle state machine.
//!
//! The only place a job's `status` changes. [`transition`] validates the
//! requested move against the transition table, applies it together with
//! its side effects (ledger writes, date stamps, queued notifications)
//! as one step, and reports illegal moves without touching anything.
//!
//! Retries are safe: re-requesting a transition for a job already in the
//! target status returns the current state with no new side effects.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::{ActorRole, Job, JobAction, JobStatus};
use crate::ledger::{JobLedger, RevisionPayload, SubmissionPayload, SubmissionStatus};
use crate::notification::{NotificationAction, NotificationDraft, NotificationKind};
use crate::types::{DbId, Timestamp};

/// The authenticated party requesting a transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: DbId,
    pub role: ActorRole,
}

impl Actor {
    pub fn worker(user_id: DbId) -> Self {
        Self {
            user_id,
            role: ActorRole::Worker,
        }
    }

    pub fn company(user_id: DbId) -> Self {
        Self {
            user_id,
            role: ActorRole::Company,
        }
    }

    pub fn admin(user_id: DbId) -> Self {
        Self {
            user_id,
            role: ActorRole::Admin,
        }
    }
}

/// A requested transition together with its payload.
///
/// Serializes with an `"action"` discriminator, which is also the wire
/// shape of the REST `transition` operation's request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TransitionAction {
    /// Company assigns a worker to an application.
    Assign { worker_id: DbId },
    /// Worker starts the job.
    Start,
    /// Worker submits (or resubmits) their work.
    Submit(SubmissionPayload),
    /// Company approves the current submission.
    Approve,
    /// Company sends the submission back for rework.
    RequestRevision(RevisionPayload),
    /// Company (while posted) or admin withdraws the job.
    Cancel,
}

impl TransitionAction {
    /// The payload-free action verb, for error reporting.
    pub fn kind(&self) -> JobAction {
        match self {
            TransitionAction::Assign { .. } => JobAction::Assign,
            TransitionAction::Start => JobAction::Start,
            TransitionAction::Submit(_) => JobAction::Submit,
            TransitionAction::Approve => JobAction::Approve,
            TransitionAction::RequestRevision(_) => JobAction::RequestRevision,
            TransitionAction::Cancel => JobAction::Cancel,
        }
    }

    /// The status this action moves a job into.
    pub fn target(&self) -> JobStatus {
        match self {
            TransitionAction::Assign { .. } => JobStatus::Assigned,
            TransitionAction::Start => JobStatus::InProgress,
            TransitionAction::Submit(_) => JobStatus::Submitted,
            TransitionAction::Approve => JobStatus::Completed,
            TransitionAction::RequestRevision(_) => JobStatus::RevisionRequested,
            TransitionAction::Cancel => JobStatus::Cancelled,
        }
    }
}

/// Result of a successfully handled transition request.
///
/// `notifications` and the ledger writes happen in the same call as the
/// status change; a state change without its notifications queued never
/// escapes this module.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    /// Job status after the call.
    pub status: JobStatus,
    /// `false` when the request was an idempotent retry and nothing
    /// changed.
    pub applied: bool,
    /// Notifications to enqueue for delivery, one per interested party.
    pub notifications: Vec<NotificationDraft>,
}

impl TransitionOutcome {
    fn noop(status: JobStatus) -> Self {
        Self {
            status,
            applied: false,
            notifications: Vec::new(),
        }
    }
}

/// Compare-and-act precondition: the status the requester last saw must
/// still be the job's status.
///
/// Run before [`transition`] when the request carries an expected
/// status. A mismatch means the decision was made against a stale view
/// and must be re-presented, not silently applied.
pub fn ensure_expected(job: &Job, expected: JobStatus) -> Result<(), CoreError> {
    if job.status != expected {
        return Err(CoreError::StaleState {
            id: job.id,
            local: expected,
            server: job.status,
        });
    }
    Ok(())
}

/// Apply `action` to `job`, recording ledger history and queueing
/// notifications as one atomic step.
///
/// Errors leave `job` and `ledger` untouched.
pub fn transition(
    job: &mut Job,
    ledger: &mut JobLedger,
    action: TransitionAction,
    actor: Actor,
    now: Timestamp,
) -> Result<TransitionOutcome, CoreError> {
    check_actor(job, &action, actor)?;

    // Idempotent retry: the job already sits in the action's target
    // status. Return current state, queue nothing.
    if job.status == action.target() {
        if let TransitionAction::Assign { worker_id } = &action {
            if job.worker_id != Some(*worker_id) {
                return Err(CoreError::InvalidTransition {
                    status: job.status,
                    action: JobAction::Assign,
                });
            }
        }
        return Ok(TransitionOutcome::noop(job.status));
    }

    match (job.status, action) {
        (JobStatus::Posted, TransitionAction::Assign { worker_id }) => {
            job.status = JobStatus::Assigned;
            job.worker_id = Some(worker_id);
            // Set exactly once, here.
            job.assigned_date = Some(now);
            Ok(TransitionOutcome {
                status: job.status,
                applied: true,
                notifications: vec![NotificationDraft {
                    user_id: worker_id,
                    kind: NotificationKind::Job,
                    title: "You were assigned a job".to_string(),
                    message: "A company accepted your application and assigned you the job."
                        .to_string(),
                    metadata: Some(NotificationAction::ViewJob { job_id: job.id }),
                }],
            })
        }

        (JobStatus::Assigned, TransitionAction::Start) => {
            job.status = JobStatus::InProgress;
            Ok(TransitionOutcome {
                status: job.status,
                applied: true,
                notifications: vec![NotificationDraft {
                    user_id: job.company_id,
                    kind: NotificationKind::Job,
                    title: "Work started".to_string(),
                    message: "The assigned worker started working on your job.".to_string(),
                    metadata: Some(NotificationAction::ViewJob { job_id: job.id }),
                }],
            })
        }

        (
            JobStatus::InProgress | JobStatus::RevisionRequested,
            TransitionAction::Submit(payload),
        ) => {
            // Ledger validation runs before any job mutation; a rejected
            // payload leaves both untouched.
            ledger.record_submission(payload, now)?;
            job.status = JobStatus::Submitted;
            Ok(TransitionOutcome {
                status: job.status,
                applied: true,
                notifications: vec![NotificationDraft {
                    user_id: job.company_id,
                    kind: NotificationKind::Submission,
                    title: "Work submitted for review".to_string(),
                    message: "The worker delivered their work. Review it to approve or request changes.".to_string(),
                    metadata: Some(NotificationAction::ReviewSubmission { job_id: job.id }),
                }],
            })
        }

        (JobStatus::Submitted, TransitionAction::Approve) => {
            let worker = job.worker_id.ok_or_else(|| {
                CoreError::Internal("submitted job has no assigned worker".to_string())
            })?;
            ledger.review_current(SubmissionStatus::Approved, now);
            job.status = JobStatus::Completed;
            job.completed_date = Some(now);
            Ok(TransitionOutcome {
                status: job.status,
                applied: true,
                notifications: vec![NotificationDraft {
                    user_id: worker,
                    kind: NotificationKind::Review,
                    title: "Submission approved".to_string(),
                    message: "The company approved your work. The job is complete.".to_string(),
                    metadata: Some(NotificationAction::ViewJob { job_id: job.id }),
                }],
            })
        }

        (JobStatus::Submitted, TransitionAction::RequestRevision(payload)) => {
            let worker = job.worker_id.ok_or_else(|| {
                CoreError::Internal("submitted job has no assigned worker".to_string())
            })?;
            let feedback = payload.feedback.clone();
            ledger.record_revision_request(payload, now)?;
            job.status = JobStatus::RevisionRequested;
            Ok(TransitionOutcome {
                status: job.status,
                applied: true,
                notifications: vec![NotificationDraft {
                    user_id: worker,
                    kind: NotificationKind::Submission,
                    title: "Revision requested".to_string(),
                    message: feedback,
                    metadata: Some(NotificationAction::ViewRevisionRequest { job_id: job.id }),
                }],
            })
        }

        (status, TransitionAction::Cancel) if !status.is_terminal() => {
            job.status = JobStatus::Cancelled;
            let mut notifications = Vec::new();
            if let Some(worker) = job.worker_id {
                if actor.user_id != worker {
                    notifications.push(cancel_notice(worker, job.id));
                }
            }
            if actor.user_id != job.company_id {
                notifications.push(cancel_notice(job.company_id, job.id));
            }
            Ok(TransitionOutcome {
                status: job.status,
                applied: true,
                notifications,
            })
        }

        (status, action) => Err(CoreError::InvalidTransition {
            status,
            action: action.kind(),
        }),
    }
}

fn cancel_notice(user_id: DbId, job_id: DbId) -> NotificationDraft {
    NotificationDraft {
        user_id,
        kind: NotificationKind::Job,
        title: "Job cancelled".to_string(),
        message: "This job was cancelled and is no longer active.".to_string(),
        metadata: Some(NotificationAction::ViewJob { job_id }),
    }
}

/// Role and identity gate for each action.
///
/// Admins may assign and cancel on behalf of a company; approval and
/// revision decisions stay with the owning company, submission with the
/// assigned worker.
fn check_actor(job: &Job, action: &TransitionAction, actor: Actor) -> Result<(), CoreError> {
    let forbidden = || CoreError::Forbidden {
        role: actor.role.as_str(),
        action: action.kind(),
    };

    match action {
        TransitionAction::Assign { .. } => match actor.role {
            ActorRole::Company if actor.user_id == job.company_id => Ok(()),
            ActorRole::Admin => Ok(()),
            _ => Err(forbidden()),
        },
        TransitionAction::Start | TransitionAction::Submit(_) => match actor.role {
            ActorRole::Worker if job.worker_id == Some(actor.user_id) => Ok(()),
            _ => Err(forbidden()),
        },
        TransitionAction::Approve | TransitionAction::RequestRevision(_) => match actor.role {
            ActorRole::Company if actor.user_id == job.company_id => Ok(()),
            _ => Err(forbidden()),
        },
        TransitionAction::Cancel => match actor.role {
            ActorRole::Admin => Ok(()),
            // A company may withdraw its own job before anyone is
            // assigned to it.
            ActorRole::Company
                if actor.user_id == job.company_id && job.status == JobStatus::Posted =>
            {
                Ok(())
            }
            ActorRole::Company
                if actor.user_id == job.company_id && job.status == JobStatus::Cancelled =>
            {
                // Idempotent retry of an earlier successful cancel.
                Ok(())
            }
            _ => Err(forbidden()),
        },
    }
}
