use crate::job::{JobAction, JobStatus};
use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot {action} a job in status '{status}'")]
    InvalidTransition {
        status: JobStatus,
        action: JobAction,
    },

    #[error("Actor role '{role}' may not {action} this job")]
    Forbidden {
        role: &'static str,
        action: JobAction,
    },

    #[error("Job {id} changed on the server (local status '{local}', server status '{server}'); re-fetch before retrying")]
    StaleState {
        id: DbId,
        local: JobStatus,
        server: JobStatus,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}
