//! Domain core for the marketplace job workflow.
//!
//! Holds the job lifecycle state machine, the append-only
//! submission/revision ledger, and the shared domain models
//! (notifications, conversations, uploads). Zero internal deps so the
//! events and client crates can both build on it.

pub mod conversation;
pub mod error;
pub mod job;
pub mod ledger;
pub mod lifecycle;
pub mod notification;
pub mod onboarding;
pub mod types;
pub mod upload;
