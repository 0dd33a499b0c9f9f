//! Reference-counted adjacency bookkeeping.
//!
//! Every peer tracks which other peers it currently holds references to
//! (successor, predecessor, finger rows, mesh neighbours). The counts are
//! a purely observational side channel for the external visualization; the
//! protocol never reads them for correctness.

use std::sync::Arc;

use dashmap::DashMap;

/// Per-peer connection table. An edge exists while at least one reference
/// to the target is held; "connections" to the owning peer itself are
/// ignored. Safe for concurrent updates from protocol calls racing with
/// snapshot reads.
#[derive(Debug)]
pub struct ConnectionTable {
    owner: Arc<str>,
    refs: DashMap<Arc<str>, u32>,
}

impl ConnectionTable {
    /// Create an empty table for the given owner id.
    pub fn new(owner: Arc<str>) -> Self {
        Self {
            owner,
            refs: DashMap::new(),
        }
    }

    /// Record one more reference from the owner to `to`.
    pub fn acquire(&self, to: &str) {
        if to == &*self.owner {
            return;
        }
        *self.refs.entry(Arc::from(to)).or_insert(0) += 1;
    }

    /// Drop one reference from the owner to `to`. The edge disappears when
    /// the count reaches zero; releasing an untracked id is a no-op.
    pub fn release(&self, to: &str) {
        let emptied = {
            let Some(mut count) = self.refs.get_mut(to) else {
                return;
            };
            *count = count.saturating_sub(1);
            *count == 0
        };
        if emptied {
            self.refs.remove_if(to, |_, count| *count == 0);
        }
    }

    /// Whether an edge to `to` currently exists.
    pub fn has(&self, to: &str) -> bool {
        self.refs.contains_key(to)
    }

    /// Snapshot of connected peer ids, sorted for stable output.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.refs.iter().map(|e| e.key().to_string()).collect();
        ids.sort();
        ids
    }

    /// Number of distinct connected peers.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Whether the table tracks no connections at all.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}
