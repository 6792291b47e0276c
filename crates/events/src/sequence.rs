//! Per-channel sequence tracking and gap detection.
//!
//! The server stamps frames on a channel with a monotonically increasing
//! sequence number where it can. A gap means at least one frame was
//! lost, and the channel's incremental deltas can no longer be trusted;
//! the consumer must fall back to a full re-fetch of that channel's
//! state before applying further deltas.

use std::collections::HashMap;

use crate::protocol::Channel;

/// What the consumer should do with an observed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqCheck {
    /// In order (or unsequenced); apply the delta.
    Apply,
    /// Same or older sequence seen before; drop the duplicate.
    Duplicate,
    /// A gap: re-fetch the channel's full state, then apply deltas again.
    Refresh,
}

/// Tracks the last sequence number observed per channel.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last_seen: HashMap<Channel, u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame's sequence number and classify it.
    ///
    /// `None` sequences are always [`SeqCheck::Apply`]: the server sent
    /// no ordering information for this event, so nothing is tracked.
    pub fn observe(&mut self, channel: Channel, seq: Option<u64>) -> SeqCheck {
        let Some(seq) = seq else {
            return SeqCheck::Apply;
        };

        match self.last_seen.get(&channel).copied() {
            None => {
                // First sequenced frame on this channel anchors tracking.
                self.last_seen.insert(channel, seq);
                SeqCheck::Apply
            }
            Some(last) if seq <= last => SeqCheck::Duplicate,
            Some(last) if seq == last + 1 => {
                self.last_seen.insert(channel, seq);
                SeqCheck::Apply
            }
            Some(_) => {
                // Gap. Trust stops here; the caller re-fetches, after
                // which this frame's seq is the new anchor.
                self.last_seen.insert(channel, seq);
                SeqCheck::Refresh
            }
        }
    }

    /// Forget a channel, e.g. after unsubscribing or a full re-fetch
    /// that re-anchors at a server-provided snapshot sequence.
    pub fn reset(&mut self, channel: Channel) {
        self.last_seen.remove(&channel);
    }

    /// Re-anchor a channel at the sequence a snapshot fetch reported.
    pub fn anchor(&mut self, channel: Channel, seq: u64) {
        self.last_seen.insert(channel, seq);
    }
}
