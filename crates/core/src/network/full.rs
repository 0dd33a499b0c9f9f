#![warn(missing_docs)]
//! The fully connected reference overlay.
//!
//! Every peer knows every other peer, so there is no routing problem to
//! solve: lookups answer "me", stores stay local, and reads broadcast to
//! all neighbours when the key is not held locally. The overlay exists as
//! the degenerate baseline next to the chord ring.

use std::sync::Arc;
use std::sync::Weak;

use crate::dht::ident::Ident;
use crate::dht::ident::NodeRef;
use crate::dht::ident::RingSpace;
use crate::error::Result;
use crate::message::MessageKind;
use crate::network::ConnectionTable;
use crate::network::NetworkCore;
use crate::storage::MemStore;

/// A peer of the fully connected overlay.
pub struct FullPeer {
    id: Arc<str>,
    n: Ident,
    data: MemStore,
    connections: Arc<ConnectionTable>,
    network: Weak<NetworkCore>,
}

impl FullPeer {
    /// Create a peer. Mesh connections are established separately by the
    /// network's overlay arrangement.
    pub(crate) fn new(network: Weak<NetworkCore>, space: &RingSpace, id: &str) -> Arc<Self> {
        let id: Arc<str> = Arc::from(id);
        let n = space.hash(&id);
        Arc::new(Self {
            connections: Arc::new(ConnectionTable::new(id.clone())),
            data: MemStore::new(),
            network,
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

    fn record(&self, kind: MessageKind, source: Option<&NodeRef>, destination: Option<&NodeRef>) {
        if let Some(network) = self.network.upgrade() {
            network.message_log().record(kind, source, destination);
        }
    }

    /// No peer is ever "responsible" for an item here, so lookups resolve
    /// to the entry peer itself and reads do the real work.
    pub fn lookup_node_for_item(&self, origin: Option<&NodeRef>, _key: &str) -> Result<NodeRef> {
        let me = self.node_ref();
        self.record(MessageKind::Lookup, origin, Some(&me));
        self.record(MessageKind::LookupResponse, Some(&me), origin);
        Ok(me)
    }

    /// Read a data item. When the client asks and the key is absent
    /// locally, the read is broadcast to every neighbour; the first hit
    /// wins. Peer-originated reads stay local so a broadcast never fans
    /// out twice.
    pub fn get_data_item(&self, origin: Option<&NodeRef>, key: &str) -> Result<Option<String>> {
        let me = self.node_ref();
        self.record(MessageKind::Get, origin, Some(&me));

        let mut value = self.data.get(key)?;
        if value.is_none() && origin.is_none() {
            for neighbour in self.connections.list() {
                let Some(network) = self.network.upgrade() else {
                    break;
                };
                let Some(peer) = network.peer(&neighbour) else {
                    continue;
                };
                if let Some(found) = peer.get_data_item(Some(&me), key)? {
                    value = Some(found);
                    break;
                }
            }
        }

        self.record(MessageKind::GetResponse, Some(&me), origin);
        Ok(value)
    }

    /// Store a data item locally.
    pub fn set_data_item(&self, origin: Option<&NodeRef>, key: &str, value: &str) -> Result<()> {
        let me = self.node_ref();
        self.record(MessageKind::Set, origin, Some(&me));
        self.data.put(key, value)?;
        self.record(MessageKind::SetResponse, Some(&me), origin);
        Ok(())
    }
}

impl std::fmt::Debug for FullPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("FullPeer")
            .field("id", &self.id)
            .field("n", &self.n)
            .finish()
    }
}
