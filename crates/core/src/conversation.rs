//! Conversation and message models.
//!
//! A conversation pairs two participants, optionally tied to a job.
//! Message order within a conversation is the server-assigned creation
//! order; clients append in arrival order and never re-sort beyond a
//! `created_at` display tiebreak.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};
use crate::upload::UploadedFile;

/// A two-party conversation, optionally attached to a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: DbId,
    pub participant_one_id: DbId,
    pub participant_two_id: DbId,
    pub job_id: Option<DbId>,
    /// Drives conversation-list ordering (most recent first).
    pub last_message_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Conversation {
    /// The participant that is not `user_id`.
    pub fn other_participant(&self, user_id: DbId) -> DbId {
        if self.participant_one_id == user_id {
            self.participant_two_id
        } else {
            self.participant_one_id
        }
    }
}

/// A server-acknowledged message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: DbId,
    pub conversation_id: DbId,
    pub sender_id: DbId,
    pub content: String,
    pub attachments: Vec<UploadedFile>,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_other_participant() {
        let convo = Conversation {
            id: 1,
            participant_one_id: 10,
            participant_two_id: 20,
            job_id: None,
            last_message_at: None,
            created_at: Utc::now(),
        };
        assert_eq!(convo.other_participant(10), 20);
        assert_eq!(convo.other_participant(20), 10);
    }
}
