#![warn(missing_docs)]
//! Chord algorithm implement.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;

use crate::dht::ident::Ident;
use crate::dht::ident::NodeRef;
use crate::dht::ident::RingSpace;
use crate::dht::types::Directory;
use crate::dht::types::RoutingMode;
use crate::dht::FingerEntry;
use crate::dht::FingerTable;
use crate::error::Error;
use crate::error::Result;
use crate::message::MessageKind;
use crate::network::ConnectionTable;
use crate::storage::MemStore;

/// A member of the chord ring.
///
/// Peers address each other by [NodeRef] and resolve the target through
/// the directory at call time; each resolved call models a protocol
/// message crossing a process boundary, and is recorded as a
/// request/response event pair unless the peer is calling itself.
///
/// The predecessor pointer is never absent: a peer pointing at itself
/// means "no predecessor learned yet". [ChordPeer::notify] relies on that
/// sentinel, see there.
///
/// Each mutable field sits behind its own lock, and no lock is ever held
/// across a call into another peer. Stabilization ticks, notify cascades
/// and client lookups from other peers' threads may therefore interleave
/// freely; the protocol self-corrects pointer drift instead of relying on
/// mutual exclusion across peers.
pub struct ChordPeer {
    id: Arc<str>,
    n: Ident,
    space: RingSpace,
    routing: RoutingMode,
    finger: Mutex<FingerTable>,
    predecessor: Mutex<NodeRef>,
    data: MemStore,
    connections: Arc<ConnectionTable>,
    directory: Weak<dyn Directory>,
}

impl ChordPeer {
    /// Create a peer. The peer is inert until [ChordPeer::join] runs; the
    /// registry is expected to register it, join it against a bootstrap
    /// peer and then start its stabilization schedule.
    pub fn new(
        directory: Weak<dyn Directory>,
        space: RingSpace,
        id: &str,
        routing: RoutingMode,
    ) -> Arc<Self> {
        let id: Arc<str> = Arc::from(id);
        let n = space.hash(&id);
        let connections = Arc::new(ConnectionTable::new(id.clone()));
        let me = NodeRef::new(id.clone(), n);
        Arc::new(Self {
            finger: Mutex::new(FingerTable::new(me.clone(), space.bits(), connections.clone())),
            predecessor: Mutex::new(me),
            data: MemStore::new(),
            connections,
            directory,
            space,
            routing,
            id,
            n,
        })
    }

    /// The node id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The identifier this peer's id hashes to.
    pub fn ident(&self) -> Ident {
        self.n
    }

    /// The routing mode chosen at construction.
    pub fn routing(&self) -> RoutingMode {
        self.routing
    }

    /// This peer's address.
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.id.clone(), self.n)
    }

    /// Connection bookkeeping of this peer.
    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Data items stored at this peer.
    pub fn data(&self) -> &MemStore {
        &self.data
    }

    /// Lock and return MutexGuard of finger table.
    pub fn lock_finger(&self) -> Result<MutexGuard<'_, FingerTable>> {
        self.finger.lock().map_err(|_| Error::SyncLockPoisoned)
    }

    fn lock_predecessor(&self) -> Result<MutexGuard<'_, NodeRef>> {
        self.predecessor.lock().map_err(|_| Error::SyncLockPoisoned)
    }

    fn directory(&self) -> Result<Arc<dyn Directory>> {
        self.directory.upgrade().ok_or(Error::NetworkDropped)
    }

    fn resolve(&self, node: &NodeRef) -> Result<Arc<ChordPeer>> {
        self.directory()?.chord_peer(node.id())
    }

    fn record(&self, kind: MessageKind, source: Option<&NodeRef>, destination: Option<&NodeRef>) {
        if let Some(directory) = self.directory.upgrade() {
            directory.message_log().record(kind, source, destination);
        }
    }

    /// The successor pointer, i.e. the row-0 finger entry. Falls back to
    /// this peer itself while the row is transiently unset during join.
    pub fn successor(&self, origin: Option<&NodeRef>) -> Result<NodeRef> {
        let me = self.node_ref();
        self.record(MessageKind::GetSuccessor, origin, Some(&me));
        let successor = self.lock_finger()?.first().unwrap_or_else(|| me.clone());
        self.record(MessageKind::GetSuccessorResponse, Some(&me), origin);
        Ok(successor)
    }

    fn set_successor(&self, node: NodeRef) -> Result<()> {
        self.lock_finger()?.set(0, node);
        Ok(())
    }

    /// The predecessor pointer. Equal to this peer itself until a real
    /// predecessor has been learned.
    pub fn predecessor(&self, origin: Option<&NodeRef>) -> Result<NodeRef> {
        let me = self.node_ref();
        self.record(MessageKind::GetPredecessor, origin, Some(&me));
        let predecessor = self.lock_predecessor()?.clone();
        self.record(MessageKind::GetPredecessorResponse, Some(&me), origin);
        Ok(predecessor)
    }

    /// Overwrite the predecessor pointer, keeping connection bookkeeping
    /// in step.
    pub fn set_predecessor(&self, origin: Option<&NodeRef>, node: NodeRef) -> Result<()> {
        let me = self.node_ref();
        self.record(MessageKind::SetPredecessor, origin, Some(&me));
        {
            let mut predecessor = self.lock_predecessor()?;
            self.connections.release(predecessor.id());
            self.connections.acquire(node.id());
            *predecessor = node;
        }
        self.record(MessageKind::SetPredecessorResponse, Some(&me), origin);
        Ok(())
    }

    /// The peer responsible for `id`: the successor of `id`'s predecessor.
    /// During transient ring inconsistency the answer may be stale, never
    /// wrong forever; the next stabilization rounds repair it.
    pub fn find_successor(&self, origin: Option<&NodeRef>, id: Ident) -> Result<NodeRef> {
        let me = self.node_ref();
        self.record(MessageKind::FindSuccessor, origin, Some(&me));
        let predecessor = self.find_predecessor(Some(&me), id)?;
        let successor = self.resolve(&predecessor)?.successor(Some(&me))?;
        self.record(MessageKind::FindSuccessorResponse, Some(&me), origin);
        tracing::debug!(
            "find_successor: self: {}, id: {}, result: {}",
            me,
            id,
            successor
        );
        Ok(successor)
    }

    /// The peer whose arc `(candidate, candidate.successor]` contains
    /// `id`, found by chasing closest-preceding fingers from this peer.
    ///
    /// Terminates unconditionally: every finger jump lands strictly inside
    /// `(candidate, id)` and thus strictly shrinks the clockwise distance
    /// to `id`, and a candidate returning itself is a fixed point.
    pub fn find_predecessor(&self, origin: Option<&NodeRef>, id: Ident) -> Result<NodeRef> {
        let me = self.node_ref();
        self.record(MessageKind::FindPredecessor, origin, Some(&me));
        let mut candidate = me.clone();
        loop {
            let peer = self.resolve(&candidate)?;
            let successor = peer.successor(Some(&me))?;
            if self
                .space
                .is_element_of(id, candidate.ident(), successor.ident(), false, true)
            {
                break;
            }
            let next = peer.closest_preceding_finger(Some(&me), id)?;
            if next == candidate {
                break;
            }
            candidate = next;
        }
        self.record(MessageKind::FindPredecessorResponse, Some(&me), origin);
        Ok(candidate)
    }

    /// The furthest finger of this peer lying strictly inside
    /// `(self, id)`, or this peer itself if no cached finger qualifies.
    /// Scanning from the top row down is what yields logarithmic hop
    /// counts once the table is populated.
    pub fn closest_preceding_finger(&self, origin: Option<&NodeRef>, id: Ident) -> Result<NodeRef> {
        let me = self.node_ref();
        self.record(MessageKind::ClosestPrecedingFinger, origin, Some(&me));
        let closest = {
            let finger = self.lock_finger()?;
            let mut closest = me.clone();
            for index in (0..finger.size()).rev() {
                if let Some(node) = finger.node(index) {
                    if self.space.is_element_of(node.ident(), self.n, id, false, false) {
                        closest = node;
                        break;
                    }
                }
            }
            closest
        };
        self.record(MessageKind::ClosestPrecedingFingerResponse, Some(&me), origin);
        Ok(closest)
    }

    /// Join the ring through `bootstrap`, or found a fresh ring when no
    /// bootstrap exists. Sets the predecessor sentinel, asks the bootstrap
    /// peer for this peer's successor, and in successor-only mode runs one
    /// immediate stabilization so the new pointers do not sit stale until
    /// the first periodic tick.
    pub fn join(&self, bootstrap: Option<&NodeRef>) -> Result<()> {
        let me = self.node_ref();
        self.set_predecessor(Some(&me), me.clone())?;
        match bootstrap {
            Some(bootstrap) => {
                let successor = self.resolve(bootstrap)?.find_successor(Some(&me), self.n)?;
                self.set_successor(successor)?;
                if self.routing == RoutingMode::SuccessorOnly {
                    self.stabilize(Some(&me))?;
                }
            }
            None => {
                // First peer out there: a ring of one.
                self.set_successor(me)?;
            }
        }
        Ok(())
    }

    /// One stabilization round: adopt the successor's predecessor as the
    /// new successor if it slots in between, then notify the successor of
    /// this peer's presence.
    pub fn stabilize(&self, origin: Option<&NodeRef>) -> Result<()> {
        let me = self.node_ref();
        self.record(MessageKind::Stabilize, origin, Some(&me));

        let successor = self.successor(Some(&me))?;
        let x = self.resolve(&successor)?.predecessor(Some(&me))?;
        if self
            .space
            .is_element_of(x.ident(), self.n, successor.ident(), false, false)
        {
            tracing::debug!("stabilize at {}: adopting successor {}", me, x);
            self.set_successor(x)?;
        }

        // Re-read: the pointer may just have changed.
        let successor = self.successor(Some(&me))?;
        self.resolve(&successor)?.notify(&me)?;

        self.record(MessageKind::StabilizeResponse, Some(&me), origin);
        Ok(())
    }

    /// Handle the claim that `candidate` may be this peer's predecessor.
    /// Adopted when no predecessor has been learned yet (the sentinel
    /// case) or when `candidate` lies strictly between the current
    /// predecessor and this peer.
    ///
    /// On adoption the replaced predecessor is stabilized immediately:
    /// its successor pointer is stale now and must move to `candidate`
    /// within this notify round rather than on its own next tick. The
    /// cascade is skipped when the replaced pointer was the sentinel,
    /// which names no real predecessor to repair and would recurse
    /// forever on a ring of one.
    pub fn notify(&self, candidate: &NodeRef) -> Result<()> {
        let me = self.node_ref();
        self.record(MessageKind::Notify, Some(candidate), Some(&me));

        let predecessor = self.predecessor(Some(&me))?;
        let sentinel = predecessor == me;
        if sentinel
            || self.space.is_element_of(
                candidate.ident(),
                predecessor.ident(),
                self.n,
                false,
                false,
            )
        {
            self.set_predecessor(Some(&me), candidate.clone())?;
            if !sentinel {
                self.resolve(&predecessor)?.stabilize(Some(&me))?;
            }
        }

        self.record(MessageKind::NotifyResponse, Some(&me), Some(candidate));
        Ok(())
    }

    /// Recompute the cached node of every finger row in
    /// `[from_inclusive, to_inclusive]`. Callers pick the range: a single
    /// row, a sub-range or the whole table.
    pub fn fix_fingers(&self, from_inclusive: usize, to_inclusive: usize) -> Result<()> {
        let me = self.node_ref();
        for index in from_inclusive..=to_inclusive {
            // find_successor locks the finger table on this peer again, so
            // the row start has to be read in its own lock scope.
            let start = {
                let finger = self.lock_finger()?;
                match finger.get(index) {
                    Some(entry) => entry.start(),
                    None => break,
                }
            };
            let node = self.find_successor(Some(&me), start)?;
            self.lock_finger()?.set(index, node);
        }
        Ok(())
    }

    /// Resolve the peer owning `key` using this peer's routing mode.
    /// Successor-only mode walks the ring linearly; finger-table mode
    /// answers locally when `hash(key)` falls in `(predecessor, self]` and
    /// otherwise routes through [ChordPeer::find_successor].
    pub fn lookup_node_for_item(&self, origin: Option<&NodeRef>, key: &str) -> Result<NodeRef> {
        let me = self.node_ref();
        self.record(MessageKind::Lookup, origin, Some(&me));
        let key_id = self.space.hash(key);
        let owner = match self.routing {
            RoutingMode::SuccessorOnly => {
                if key_id == self.n {
                    me.clone()
                } else {
                    let successor = self.successor(Some(&me))?;
                    if self
                        .space
                        .is_element_of(key_id, self.n, successor.ident(), false, true)
                    {
                        successor
                    } else {
                        // The owner is further ahead; let the successor
                        // continue the walk.
                        self.resolve(&successor)?
                            .lookup_node_for_item(Some(&me), key)?
                    }
                }
            }
            RoutingMode::FingerTable => {
                let predecessor = self.predecessor(Some(&me))?;
                if self
                    .space
                    .is_element_of(key_id, predecessor.ident(), self.n, false, true)
                {
                    me.clone()
                } else {
                    self.find_successor(Some(&me), key_id)?
                }
            }
        };
        tracing::debug!(
            "lookup at {}: item with hash {} belongs to {}",
            me,
            key_id,
            owner
        );
        self.record(MessageKind::LookupResponse, Some(&me), origin);
        Ok(owner)
    }

    /// Read a data item stored at this peer. Routing to the owning peer is
    /// the caller's responsibility; this never re-routes.
    pub fn get_data_item(&self, origin: Option<&NodeRef>, key: &str) -> Result<Option<String>> {
        let me = self.node_ref();
        self.record(MessageKind::Get, origin, Some(&me));
        let value = self.data.get(key)?;
        self.record(MessageKind::GetResponse, Some(&me), origin);
        Ok(value)
    }

    /// Store a data item at this peer. Never re-routes.
    pub fn set_data_item(&self, origin: Option<&NodeRef>, key: &str, value: &str) -> Result<()> {
        let me = self.node_ref();
        self.record(MessageKind::Set, origin, Some(&me));
        self.data.put(key, value)?;
        self.record(MessageKind::SetResponse, Some(&me), origin);
        Ok(())
    }

    /// Successor pointer without emitting protocol events, for inspection.
    pub fn successor_snapshot(&self) -> Result<NodeRef> {
        Ok(self
            .lock_finger()?
            .first()
            .unwrap_or_else(|| self.node_ref()))
    }

    /// Predecessor pointer without emitting protocol events, for
    /// inspection.
    pub fn predecessor_snapshot(&self) -> Result<NodeRef> {
        Ok(self.lock_predecessor()?.clone())
    }

    /// Copy of the finger rows without emitting protocol events, for
    /// inspection.
    pub fn finger_snapshot(&self) -> Result<Vec<FingerEntry>> {
        Ok(self.lock_finger()?.entries().to_vec())
    }
}

impl std::fmt::Debug for ChordPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ChordPeer")
            .field("id", &self.id)
            .field("n", &self.n)
            .field("routing", &self.routing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::KeyHasher;
    use crate::network::Network;
    use crate::network::NetworkConfig;

    struct NumericHasher;

    impl KeyHasher for NumericHasher {
        fn digest(&self, value: &str) -> u64 {
            value.parse().unwrap_or(0)
        }
    }

    fn network(routing: RoutingMode) -> Network {
        Network::with_hasher(
            NetworkConfig::chord(3, routing).manual_stabilization(),
            Arc::new(NumericHasher),
        )
        .unwrap()
    }

    #[test]
    fn test_first_peer_founds_a_ring_of_one() {
        let net = network(RoutingMode::FingerTable);
        let peer = net.create_peer("1").unwrap();
        let chord = peer.as_chord().unwrap();

        assert_eq!(chord.ident(), 1);
        assert_eq!(chord.successor_snapshot().unwrap().id(), "1");
        assert_eq!(chord.predecessor_snapshot().unwrap().id(), "1");
    }

    #[test]
    fn test_two_peers_become_mutual_neighbours() {
        let net = network(RoutingMode::SuccessorOnly);
        let p1 = net.create_peer("1").unwrap();
        let p3 = net.create_peer("3").unwrap();
        let c1 = p1.as_chord().unwrap();
        let c3 = p3.as_chord().unwrap();

        // p3's join already stabilized itself once; one round on p1
        // closes the two-peer ring in both directions.
        c1.stabilize(Some(&c1.node_ref())).unwrap();

        assert_eq!(c1.successor_snapshot().unwrap().id(), "3");
        assert_eq!(c1.predecessor_snapshot().unwrap().id(), "3");
        assert_eq!(c3.successor_snapshot().unwrap().id(), "1");
        assert_eq!(c3.predecessor_snapshot().unwrap().id(), "1");
    }

    #[test]
    fn test_closest_preceding_finger_scans_top_down() {
        let net = network(RoutingMode::FingerTable);
        let peer = net.create_peer("1").unwrap();
        let chord = peer.as_chord().unwrap();
        let me = chord.node_ref();

        // nothing cached yet: the peer itself is the answer
        assert_eq!(
            chord.closest_preceding_finger(Some(&me), 5).unwrap().id(),
            "1"
        );

        chord.lock_finger().unwrap().set(0, NodeRef::new("2", 2));
        chord.lock_finger().unwrap().set(1, NodeRef::new("4", 4));

        // the highest qualifying row wins
        assert_eq!(
            chord.closest_preceding_finger(Some(&me), 6).unwrap().id(),
            "4"
        );
        // 4 is outside (1, 4); the next row down still precedes it
        assert_eq!(
            chord.closest_preceding_finger(Some(&me), 4).unwrap().id(),
            "2"
        );
        // (1, 2) is empty, so no finger qualifies at all
        assert_eq!(
            chord.closest_preceding_finger(Some(&me), 2).unwrap().id(),
            "1"
        );
    }
}
