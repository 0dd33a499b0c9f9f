//! Serializable snapshots of a running network, the boundary consumed by
//! the external visualization and logging tooling.

use serde::Deserialize;
use serde::Serialize;

use crate::dht::Ident;
use crate::error::Result;
use crate::network::Network;
use crate::network::Overlay;
use crate::network::Peer;

/// Snapshot of a whole network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInspect {
    /// Identifier width m.
    pub bits: u8,
    /// Overlay kind.
    pub overlay: Overlay,
    /// All registered peers, ordered by ring position.
    pub peers: Vec<PeerInspect>,
    /// Number of protocol events recorded so far.
    pub message_count: usize,
}

/// Snapshot of a single peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInspect {
    /// Node id.
    pub id: String,
    /// Ring position.
    pub ident: Ident,
    /// Successor node id; absent for non-chord peers.
    pub successor: Option<String>,
    /// Predecessor node id; absent for non-chord peers.
    pub predecessor: Option<String>,
    /// Finger rows; empty for non-chord peers.
    pub fingers: Vec<FingerInspect>,
    /// Connected peer ids.
    pub connections: Vec<String>,
    /// Data items stored at the peer, in key order.
    pub data: Vec<(String, String)>,
}

/// Snapshot of one finger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerInspect {
    /// Start of the covered interval, inclusive.
    pub start: Ident,
    /// End of the covered interval, exclusive.
    pub end: Ident,
    /// Cached node id of the interval owner.
    pub node: Option<String>,
}

impl NetworkInspect {
    /// Snapshot `network`. Reads pointer fields without emitting protocol
    /// events, so inspection never shows up in the message history.
    pub fn inspect(network: &Network) -> Result<Self> {
        let mut peers = Vec::new();
        for peer in network.peers() {
            peers.push(PeerInspect::inspect(&peer)?);
        }
        peers.sort_by(|a, b| a.ident.cmp(&b.ident).then_with(|| a.id.cmp(&b.id)));
        Ok(Self {
            bits: network.space().bits(),
            overlay: network.overlay(),
            peers,
            message_count: network.messages().len(),
        })
    }
}

impl PeerInspect {
    /// Snapshot a single peer.
    pub fn inspect(peer: &Peer) -> Result<Self> {
        let (successor, predecessor, fingers) = match peer {
            Peer::Chord(chord) => {
                let fingers = chord
                    .finger_snapshot()?
                    .iter()
                    .map(|entry| FingerInspect {
                        start: entry.start(),
                        end: entry.end(),
                        node: entry.node().map(|node| node.id().to_string()),
                    })
                    .collect();
                (
                    Some(chord.successor_snapshot()?.id().to_string()),
                    Some(chord.predecessor_snapshot()?.id().to_string()),
                    fingers,
                )
            }
            Peer::FullyConnected(_) => (None, None, Vec::new()),
        };
        Ok(Self {
            id: peer.id().to_string(),
            ident: peer.node_ref().ident(),
            successor,
            predecessor,
            fingers,
            connections: peer.connections().list(),
            data: peer.data().get_all()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::RoutingMode;
    use crate::network::NetworkConfig;

    #[test]
    fn test_snapshot_is_ordered_and_serializable() {
        let network = Network::new(
            NetworkConfig::chord(3, RoutingMode::SuccessorOnly).manual_stabilization(),
        )
        .unwrap();
        // "beta" hashes to 2 and "alpha" to 6 on the 3-bit ring
        network.create_peer("alpha").unwrap();
        network.create_peer("beta").unwrap();

        let snapshot = NetworkInspect::inspect(&network).unwrap();
        assert_eq!(snapshot.bits, 3);
        assert_eq!(snapshot.peers.len(), 2);
        assert_eq!(snapshot.peers[0].id, "beta");
        assert_eq!(snapshot.peers[1].id, "alpha");
        assert_eq!(snapshot.peers[0].fingers.len(), 3);
        assert!(snapshot.message_count > 0, "joins are protocol traffic");

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: NetworkInspect = serde_json::from_str(&json).unwrap();
        assert_eq!(back.peers, snapshot.peers);
    }
}
