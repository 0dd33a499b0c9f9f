#![warn(missing_docs)]
//! Finger table of the chord ring.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::ident::Ident;
use crate::dht::ident::NodeRef;
use crate::network::ConnectionTable;

/// Row k of a finger table owned by a peer at identifier n. The interval
/// `[start, end)` with `start = (n + 2^k) mod 2^m` and
/// `end = (n + 2^(k+1)) mod 2^m` is fixed at construction; only the cached
/// owner of `start` changes. Row 0 spans exactly `[n+1, n+2)`, so its node
/// is by convention the peer's successor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerEntry {
    start: Ident,
    end: Ident,
    node: Option<NodeRef>,
}

impl FingerEntry {
    fn new(n: Ident, bits: u8, k: u8) -> Self {
        let size = 1u64 << bits;
        Self {
            start: (n + (1u64 << k)) % size,
            end: (n + (1u64 << (k + 1))) % size,
            node: None,
        }
    }

    /// Start of the covered interval, inclusive.
    pub fn start(&self) -> Ident {
        self.start
    }

    /// End of the covered interval, exclusive.
    pub fn end(&self) -> Ident {
        self.end
    }

    /// The peer currently believed responsible for `start`.
    pub fn node(&self) -> Option<&NodeRef> {
        self.node.as_ref()
    }
}

impl fmt::Display for FingerEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.node {
            Some(node) => write!(f, "[{},{}) : {}", self.start, self.end, node),
            None => write!(f, "[{},{}) : -", self.start, self.end),
        }
    }
}

/// Finger table of a chord peer: m rows of routing shortcuts. Mutating a
/// row keeps the owner's connection bookkeeping in step, releasing the
/// previously cached node and acquiring the new one.
#[derive(Debug)]
pub struct FingerTable {
    owner: NodeRef,
    connections: Arc<ConnectionTable>,
    entries: Vec<FingerEntry>,
}

impl FingerTable {
    /// Build the table for `owner` with one row per identifier bit.
    pub fn new(owner: NodeRef, bits: u8, connections: Arc<ConnectionTable>) -> Self {
        let entries = (0..bits)
            .map(|k| FingerEntry::new(owner.ident(), bits, k))
            .collect();
        Self {
            owner,
            connections,
            entries,
        }
    }

    /// Number of rows, m.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Row accessor.
    pub fn get(&self, index: usize) -> Option<&FingerEntry> {
        self.entries.get(index)
    }

    /// The cached node of a row.
    pub fn node(&self, index: usize) -> Option<NodeRef> {
        self.entries.get(index).and_then(|e| e.node.clone())
    }

    /// The row-0 node, i.e. the owner's successor.
    pub fn first(&self) -> Option<NodeRef> {
        self.node(0)
    }

    /// Cache `node` as the owner of row `index`'s start point.
    pub fn set(&mut self, index: usize, node: NodeRef) {
        let Some(entry) = self.entries.get_mut(index) else {
            tracing::error!("set finger index out of range, index: {}", index);
            return;
        };
        if let Some(prev) = entry.node.take() {
            self.connections.release(prev.id());
        }
        self.connections.acquire(node.id());
        tracing::debug!("finger changed at {}: row {} -> {}", self.owner, index, node);
        entry.node = Some(node);
    }

    /// All rows, for inspection snapshots.
    pub fn entries(&self) -> &[FingerEntry] {
        &self.entries
    }
}

impl fmt::Display for FingerTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (index, entry) in self.entries.iter().enumerate() {
            writeln!(f, "finger {index}: {entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_for(id: &str, n: Ident, bits: u8) -> FingerTable {
        let connections = Arc::new(ConnectionTable::new(Arc::from(id)));
        FingerTable::new(NodeRef::new(id, n), bits, connections)
    }

    #[test]
    fn test_row_intervals() {
        // Rows of a peer at n=1 on an 8-point ring:
        // k=0: [2,3), k=1: [3,5), k=2: [5,1).
        let table = table_for("one", 1, 3);
        assert_eq!(table.size(), 3);
        let bounds: Vec<(Ident, Ident)> = table
            .entries()
            .iter()
            .map(|e| (e.start(), e.end()))
            .collect();
        assert_eq!(bounds, vec![(2, 3), (3, 5), (5, 1)]);
        assert!(table.entries().iter().all(|e| e.node().is_none()));
    }

    #[test]
    fn test_set_updates_connections() {
        let connections = Arc::new(ConnectionTable::new(Arc::from("one")));
        let mut table = FingerTable::new(NodeRef::new("one", 1), 3, connections.clone());

        let a = NodeRef::new("a", 3);
        let b = NodeRef::new("b", 6);

        table.set(0, a.clone());
        table.set(1, a.clone());
        assert_eq!(table.first(), Some(a.clone()));
        assert!(connections.has("a"));

        // replacing one cached row keeps the other reference alive
        table.set(0, b.clone());
        assert!(connections.has("a"));
        assert!(connections.has("b"));

        table.set(1, b.clone());
        assert!(!connections.has("a"));
        assert_eq!(table.node(1), Some(b));
    }

    #[test]
    fn test_set_out_of_range_is_ignored() {
        let mut table = table_for("one", 1, 3);
        table.set(3, NodeRef::new("a", 3));
        assert!(table.entries().iter().all(|e| e.node().is_none()));
    }

    #[test]
    fn test_row_zero_is_successor() {
        let mut table = table_for("one", 1, 3);
        let succ = NodeRef::new("two", 2);
        table.set(0, succ.clone());
        assert_eq!(table.first(), Some(succ));
    }
}
