//! Online-user tracking
//!
//! The broker periodically broadcasts the full set of online users. Each
//! snapshot replaces the previous one wholesale; nothing is patched and no
//! history is kept.

use std::collections::HashSet;
use tokio::sync::watch;

use crate::identity::Identity;

/// Latest presence snapshot, observable from other tasks
pub struct PresenceTracker {
    tx: watch::Sender<Vec<Identity>>,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx }
    }

    /// Replace the current snapshot.
    ///
    /// Duplicates collapse to their first occurrence. The swap is a single
    /// `send_replace`, so readers see either the old or the new list.
    pub fn replace(&self, snapshot: Vec<Identity>) {
        let mut seen = HashSet::with_capacity(snapshot.len());
        let deduped: Vec<Identity> = snapshot
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        self.tx.send_replace(deduped);
    }

    pub fn clear(&self) {
        self.tx.send_replace(Vec::new());
    }

    /// Raw snapshot, including the acting user
    pub fn snapshot(&self) -> Vec<Identity> {
        self.tx.borrow().clone()
    }

    /// Users the acting identity can open a private conversation with
    pub fn selectable(&self, me: Option<&Identity>) -> Vec<Identity> {
        self.tx
            .borrow()
            .iter()
            .filter(|id| Some(*id) != me)
            .cloned()
            .collect()
    }

    pub fn is_online(&self, id: &Identity) -> bool {
        self.tx.borrow().contains(id)
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Receiver that observes every future snapshot
    pub fn subscribe(&self) -> watch::Receiver<Vec<Identity>> {
        self.tx.subscribe()
    }
}
