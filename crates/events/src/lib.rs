//! Push-channel layer: wire protocol, in-process fan-out, per-channel
//! sequence tracking, and the long-lived connection manager.
//!
//! Delivery guarantees mirror the server's: at-most-once, ordered within
//! a channel, unordered across channels. Anything stronger (catching up
//! after a gap or a disconnect) is the consumers' job, signalled through
//! [`sequence::SequenceTracker`].

pub mod bus;
pub mod connection;
pub mod protocol;
pub mod sequence;
