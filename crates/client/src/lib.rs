//! Client-side sync layer: the REST collaborator interface and the two
//! reconcilers that keep local state consistent across the REST and
//! push channels.
//!
//! The REST path and the push path update independently; the
//! [`notifications::NotificationReconciler`] and
//! [`conversations::ConversationSync`] fold both into one local view,
//! falling back to a full re-fetch whenever push delivery is suspect.

pub mod api;
pub mod conversations;
pub mod http;
pub mod notifications;
pub mod optimistic;
