//! Optimistic apply / confirm / rollback.
//!
//! Both the notification reconciler and the conversation synchronizer
//! apply local changes before the server confirms them. This helper
//! owns that pattern once: the apply step performs the mutation and
//! builds its exact inverse, and rollback runs that inverse. Only the
//! touched entries are restored, so updates folded in from the push
//! channel while the request was in flight survive a rollback. Bulk
//! operations build one inverse covering every touched entry, so
//! partial failure rolls back as a unit rather than per item.

/// One in-flight optimistic change over a state slice.
#[must_use = "an unconfirmed optimistic update should be confirmed or rolled back"]
pub struct OptimisticUpdate<S> {
    undo: Box<dyn FnOnce(&mut S) + Send>,
}

impl<S> OptimisticUpdate<S> {
    /// Apply the local change. `apply` mutates the slice and returns
    /// the inverse of exactly what it changed.
    pub fn begin<A, U>(slice: &mut S, apply: A) -> Self
    where
        A: FnOnce(&mut S) -> U,
        U: FnOnce(&mut S) + Send + 'static,
    {
        let undo = apply(slice);
        Self {
            undo: Box::new(undo),
        }
    }

    /// Server accepted: the local state is now authoritative enough.
    pub fn confirm(self) {}

    /// Server rejected: run the inverse of the applied change.
    ///
    /// The inverse must re-locate its targets (by id, not index) and
    /// leave anything it did not touch alone.
    pub fn rollback(self, slice: &mut S) {
        (self.undo)(slice);
    }
}
