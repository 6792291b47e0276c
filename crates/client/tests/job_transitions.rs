//! Conflict handling for job transitions requested over REST.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;

use common::MockApi;
use lancer_client::api::{transition_with_refresh, TransitionFailure};
use lancer_core::job::{Job, JobStatus};
use lancer_core::lifecycle::TransitionAction;

#[tokio::test]
async fn test_transition_applies_when_server_state_matches() {
    let api = Arc::new(MockApi::new());
    let job = Job::posted(1, 50, None);
    api.with_state(|s| {
        s.jobs.insert(1, job.clone());
    });

    let updated = transition_with_refresh(&*api, &job, &TransitionAction::Assign { worker_id: 7 })
        .await
        .unwrap();

    assert_eq!(updated.status, JobStatus::Assigned);
}

#[tokio::test]
async fn test_conflict_returns_stale_with_fresh_job() {
    let api = Arc::new(MockApi::new());
    // The client still sees the job as submitted; an admin cancelled it
    // on the server meanwhile.
    let mut local = Job::posted(1, 50, None);
    local.status = JobStatus::Submitted;
    let mut server = local.clone();
    server.status = JobStatus::Cancelled;
    api.with_state(|s| {
        s.jobs.insert(1, server);
    });

    let result = transition_with_refresh(&*api, &local, &TransitionAction::Approve).await;

    assert_matches!(result, Err(TransitionFailure::Stale { latest }) => {
        assert_eq!(latest.status, JobStatus::Cancelled);
    });
}
