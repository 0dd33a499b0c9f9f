#![warn(missing_docs)]
//! The peer registry and overlay management.
//!
//! A [Network] is the shared directory of all live peers: it creates and
//! registers peers for the configured overlay kind, hands out random
//! bootstrap peers, carries the shared protocol-event log, runs the
//! per-peer stabilization schedules, and offers the client-facing get/set
//! entry points that route through an arbitrary entry peer.

mod connections;
pub mod full;

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

pub use connections::ConnectionTable;
use dashmap::DashMap;
pub use full::FullPeer;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use crate::dht::ChordPeer;
use crate::dht::Directory;
use crate::dht::KeyHasher;
use crate::dht::NodeRef;
use crate::dht::RingSpace;
use crate::dht::RoutingMode;
use crate::dht::Sha1Fold;
use crate::dht::Stabilizer;
use crate::error::Error;
use crate::error::Result;
use crate::message::Message;
use crate::message::MessageKind;
use crate::message::MessageLog;
use crate::storage::MemStore;

/// Which overlay a network runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Overlay {
    /// The chord ring, with its default routing mode for new peers.
    Chord {
        /// Routing mode given to peers created without an explicit one.
        routing: RoutingMode,
    },
    /// The trivial fully connected mesh.
    FullyConnected,
}

/// Construction-time configuration of a [Network].
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    /// Identifier width m, validated against `[2, 56]`.
    pub bits: u8,
    /// Overlay kind.
    pub overlay: Overlay,
    /// Cadence of each peer's periodic stabilization.
    pub stabilize_interval: Duration,
    /// Whether joining peers get a periodic stabilization task. Turn off
    /// to drive stabilization rounds manually (tests do).
    pub auto_stabilize: bool,
}

impl NetworkConfig {
    /// Chord overlay with the given width and default routing mode.
    pub fn chord(bits: u8, routing: RoutingMode) -> Self {
        Self {
            bits,
            overlay: Overlay::Chord { routing },
            stabilize_interval: Duration::from_millis(DEFAULT_STABILIZE_INTERVAL_MS),
            auto_stabilize: true,
        }
    }

    /// Fully connected overlay with the given width.
    pub fn fully_connected(bits: u8) -> Self {
        Self {
            bits,
            overlay: Overlay::FullyConnected,
            stabilize_interval: Duration::from_millis(DEFAULT_STABILIZE_INTERVAL_MS),
            auto_stabilize: false,
        }
    }

    /// Override the stabilization cadence.
    pub fn stabilize_every(mut self, interval: Duration) -> Self {
        self.stabilize_interval = interval;
        self
    }

    /// Disable the periodic stabilization tasks.
    pub fn manual_stabilization(mut self) -> Self {
        self.auto_stabilize = false;
        self
    }
}

/// A registered peer: one variant per overlay kind. The closed set is
/// resolved at network construction time; there is no open-ended peer
/// plugability.
#[derive(Clone, Debug)]
pub enum Peer {
    /// A chord ring member.
    Chord(Arc<ChordPeer>),
    /// A fully connected mesh member.
    FullyConnected(Arc<FullPeer>),
}

impl Peer {
    /// The node id.
    pub fn id(&self) -> &str {
        match self {
            Peer::Chord(peer) => peer.id(),
            Peer::FullyConnected(peer) => peer.id(),
        }
    }

    /// This peer's address.
    pub fn node_ref(&self) -> NodeRef {
        match self {
            Peer::Chord(peer) => peer.node_ref(),
            Peer::FullyConnected(peer) => peer.node_ref(),
        }
    }

    /// Resolve the peer owning `key`, starting from this peer.
    pub fn lookup_node_for_item(&self, origin: Option<&NodeRef>, key: &str) -> Result<NodeRef> {
        match self {
            Peer::Chord(peer) => peer.lookup_node_for_item(origin, key),
            Peer::FullyConnected(peer) => peer.lookup_node_for_item(origin, key),
        }
    }

    /// Read a data item at this peer.
    pub fn get_data_item(&self, origin: Option<&NodeRef>, key: &str) -> Result<Option<String>> {
        match self {
            Peer::Chord(peer) => peer.get_data_item(origin, key),
            Peer::FullyConnected(peer) => peer.get_data_item(origin, key),
        }
    }

    /// Store a data item at this peer.
    pub fn set_data_item(&self, origin: Option<&NodeRef>, key: &str, value: &str) -> Result<()> {
        match self {
            Peer::Chord(peer) => peer.set_data_item(origin, key, value),
            Peer::FullyConnected(peer) => peer.set_data_item(origin, key, value),
        }
    }

    /// Connection bookkeeping of this peer.
    pub fn connections(&self) -> &ConnectionTable {
        match self {
            Peer::Chord(peer) => peer.connections(),
            Peer::FullyConnected(peer) => peer.connections(),
        }
    }

    /// Data items stored at this peer.
    pub fn data(&self) -> &MemStore {
        match self {
            Peer::Chord(peer) => peer.data(),
            Peer::FullyConnected(peer) => peer.data(),
        }
    }

    /// The chord view of this peer, if it is one.
    pub fn as_chord(&self) -> Option<&Arc<ChordPeer>> {
        match self {
            Peer::Chord(peer) => Some(peer),
            Peer::FullyConnected(_) => None,
        }
    }
}

/// The shared state peers hold a weak reference to: the identifier space,
/// the id-to-peer map and the protocol-event log.
#[derive(Debug)]
pub struct NetworkCore {
    space: RingSpace,
    overlay: Overlay,
    peers: DashMap<Arc<str>, Peer>,
    log: MessageLog,
}

impl NetworkCore {
    /// The shared protocol-event log.
    pub fn message_log(&self) -> &MessageLog {
        &self.log
    }

    /// Look up any peer by node id.
    pub fn peer(&self, id: &str) -> Option<Peer> {
        self.peers.get(id).map(|entry| entry.value().clone())
    }
}

impl Directory for NetworkCore {
    fn chord_peer(&self, id: &str) -> Result<Arc<ChordPeer>> {
        match self.peers.get(id) {
            Some(entry) => match entry.value() {
                Peer::Chord(peer) => Ok(peer.clone()),
                Peer::FullyConnected(_) => Err(Error::NotAChordPeer(id.to_string())),
            },
            None => Err(Error::PeerNotFound(id.to_string())),
        }
    }

    fn message_log(&self) -> &MessageLog {
        &self.log
    }
}

/// A running overlay network.
pub struct Network {
    core: Arc<NetworkCore>,
    stabilize_interval: Duration,
    auto_stabilize: bool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Network {
    /// Build a network with the default key hasher. Fails fast on an
    /// unsupported identifier width.
    pub fn new(config: NetworkConfig) -> Result<Self> {
        Self::with_hasher(config, Arc::new(Sha1Fold))
    }

    /// Build a network with a caller-supplied key hasher.
    pub fn with_hasher(config: NetworkConfig, hasher: Arc<dyn KeyHasher>) -> Result<Self> {
        let space = RingSpace::with_hasher(config.bits, hasher)?;
        Ok(Self {
            core: Arc::new(NetworkCore {
                space,
                overlay: config.overlay,
                peers: DashMap::new(),
                log: MessageLog::new(),
            }),
            stabilize_interval: config.stabilize_interval,
            auto_stabilize: config.auto_stabilize,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// The identifier space of this network.
    pub fn space(&self) -> &RingSpace {
        &self.core.space
    }

    /// The overlay kind of this network.
    pub fn overlay(&self) -> Overlay {
        self.core.overlay
    }

    /// Create, register and join a peer with the overlay's default routing
    /// mode.
    pub fn create_peer(&self, id: &str) -> Result<Peer> {
        let routing = match self.core.overlay {
            Overlay::Chord { routing } => routing,
            Overlay::FullyConnected => RoutingMode::SuccessorOnly,
        };
        self.create_peer_with(id, routing)
    }

    /// Create, register and join a peer. For the chord overlay the random
    /// bootstrap peer is picked before registration, so the first peer
    /// bootstraps off nothing and no peer ever bootstraps off itself. The
    /// fully connected overlay ignores the routing mode.
    pub fn create_peer_with(&self, id: &str, routing: RoutingMode) -> Result<Peer> {
        match self.core.overlay {
            Overlay::Chord { .. } => {
                let bootstrap = self.random_peer().map(|peer| peer.node_ref());
                let core: Arc<dyn Directory> = self.core.clone();
                let directory: std::sync::Weak<dyn Directory> = Arc::downgrade(&core);
                let peer = ChordPeer::new(directory, self.core.space.clone(), id, routing);
                self.register(Peer::Chord(peer.clone()))?;
                peer.join(bootstrap.as_ref())?;
                if self.auto_stabilize {
                    self.spawn_stabilizer(peer.clone())?;
                }
                Ok(Peer::Chord(peer))
            }
            Overlay::FullyConnected => {
                let peer = FullPeer::new(Arc::downgrade(&self.core), &self.core.space, id);
                self.register(Peer::FullyConnected(peer.clone()))?;
                Ok(Peer::FullyConnected(peer))
            }
        }
    }

    fn register(&self, peer: Peer) -> Result<()> {
        let key: Arc<str> = Arc::from(peer.id());
        match self.core.peers.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Error::DuplicatePeer(peer.id().to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                tracing::debug!("registering peer {}", peer.node_ref());
                vacant.insert(peer);
                Ok(())
            }
        }
    }

    fn spawn_stabilizer(&self, peer: Arc<ChordPeer>) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| Error::NoAsyncRuntime)?;
        let task = handle.spawn(Stabilizer::new(peer).run(self.stabilize_interval));
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
        Ok(())
    }

    /// Look up a peer by node id.
    pub fn peer(&self, id: &str) -> Option<Peer> {
        self.core.peer(id)
    }

    /// A uniformly random registered peer, or none while the network is
    /// empty.
    pub fn random_peer(&self) -> Option<Peer> {
        let peers: Vec<Peer> = self
            .core
            .peers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        peers.choose(&mut rand::thread_rng()).cloned()
    }

    /// Snapshot of all registered peers.
    pub fn peers(&self) -> Vec<Peer> {
        self.core
            .peers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.core.peers.len()
    }

    /// Whether no peer has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.core.peers.is_empty()
    }

    /// Client read: resolve the owner of `key` through `entry`, then read
    /// the item there. An absent key is a normal `Ok(None)`.
    pub fn get(&self, entry: &Peer, key: &str) -> Result<Option<String>> {
        let owner = entry.lookup_node_for_item(None, key)?;
        let owner = self
            .core
            .peer(owner.id())
            .ok_or_else(|| Error::PeerNotFound(owner.id().to_string()))?;
        owner.get_data_item(None, key)
    }

    /// Client write: resolve the owner of `key` through `entry`, then
    /// store the item there.
    pub fn set(&self, entry: &Peer, key: &str, value: &str) -> Result<()> {
        let owner = entry.lookup_node_for_item(None, key)?;
        let owner = self
            .core
            .peer(owner.id())
            .ok_or_else(|| Error::PeerNotFound(owner.id().to_string()))?;
        owner.set_data_item(None, key, value)
    }

    /// Manually repair finger rows `[from, to]` of one peer, with both
    /// indices clamped into `[0, m-1]`.
    pub fn fix_fingers(&self, id: &str, from: usize, to: usize) -> Result<()> {
        let peer = self.core.chord_peer(id)?;
        let top = self.core.space.bits() as usize - 1;
        peer.fix_fingers(from.min(top), to.min(top))
    }

    /// Repair every finger row of every chord peer.
    pub fn fix_all_fingers(&self) -> Result<()> {
        let top = self.core.space.bits() as usize - 1;
        for peer in self.peers() {
            if let Peer::Chord(peer) = peer {
                peer.fix_fingers(0, top)?;
            }
        }
        Ok(())
    }

    /// Arrange the overlay structure where peers do not do so themselves:
    /// meshes all peer pairs of a fully connected network. Chord peers
    /// keep the structure intact on their own, so this is a no-op there.
    pub fn arrange_overlay_structure(&self) {
        if self.core.overlay != Overlay::FullyConnected {
            return;
        }
        let ids: Vec<String> = self
            .core
            .peers
            .iter()
            .map(|entry| entry.key().to_string())
            .collect();
        for entry in self.core.peers.iter() {
            for id in &ids {
                if id != entry.value().id() {
                    entry.value().connections().acquire(id);
                }
            }
        }
    }

    /// Copy of the protocol-event history.
    pub fn messages(&self) -> Vec<Message> {
        self.core.log.snapshot()
    }

    /// Number of recorded events of one kind.
    pub fn message_count(&self, kind: MessageKind) -> usize {
        self.core.log.count_of(kind)
    }

    /// Forget the protocol-event history.
    pub fn clear_messages(&self) {
        self.core.log.clear()
    }

    /// Stop all periodic stabilization tasks. Idempotent; also runs on
    /// drop.
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.shutdown();
    }
}
