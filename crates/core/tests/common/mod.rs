#![allow(dead_code)]

use std::sync::Arc;

use ringlab_core::dht::KeyHasher;
use ringlab_core::dht::RoutingMode;
use ringlab_core::network::Network;
use ringlab_core::network::NetworkConfig;
use ringlab_core::network::Peer;

/// Hashes numeric node ids and keys to themselves, pinning peers to exact
/// ring positions for deterministic scenarios.
pub struct NumericHasher;

impl KeyHasher for NumericHasher {
    fn digest(&self, value: &str) -> u64 {
        value.parse().unwrap_or(0)
    }
}

/// A chord network with numeric placement and no background stabilizers;
/// tests drive stabilization rounds by hand.
pub fn manual_chord_network(bits: u8, routing: RoutingMode) -> Network {
    Network::with_hasher(
        NetworkConfig::chord(bits, routing).manual_stabilization(),
        Arc::new(NumericHasher),
    )
    .unwrap()
}

/// One stabilization round over the given peers, in order.
pub fn stabilize_round(peers: &[Peer]) {
    for peer in peers {
        let chord = peer.as_chord().expect("chord peer");
        let me = chord.node_ref();
        chord.stabilize(Some(&me)).unwrap();
    }
}

/// (id, successor id, predecessor id) per peer.
pub fn pointer_state(peers: &[Peer]) -> Vec<(String, String, String)> {
    peers
        .iter()
        .map(|peer| {
            let chord = peer.as_chord().expect("chord peer");
            (
                peer.id().to_string(),
                chord.successor_snapshot().unwrap().id().to_string(),
                chord.predecessor_snapshot().unwrap().id().to_string(),
            )
        })
        .collect()
}

/// Run stabilization rounds until the successor/predecessor pointers stop
/// changing. Round order is fixed, so an unchanged state is a true fixed
/// point.
pub fn stabilize_to_fixpoint(peers: &[Peer]) {
    let mut previous = pointer_state(peers);
    for _ in 0..64 {
        stabilize_round(peers);
        let current = pointer_state(peers);
        if current == previous {
            return;
        }
        previous = current;
    }
    panic!("ring did not stabilize within 64 rounds");
}

/// Follow successor pointers from the first peer and assert they form a
/// single cycle visiting every peer exactly once.
pub fn assert_successor_cycle(network: &Network, peers: &[Peer]) {
    let start = peers[0].id().to_string();
    let mut visited = vec![start.clone()];
    let mut current = start.clone();
    loop {
        let peer = network.peer(&current).unwrap();
        let next = peer
            .as_chord()
            .expect("chord peer")
            .successor_snapshot()
            .unwrap()
            .id()
            .to_string();
        if next == start {
            break;
        }
        assert!(
            !visited.contains(&next),
            "successor chain revisited {next} before closing the cycle"
        );
        visited.push(next.clone());
        current = next;
    }
    assert_eq!(visited.len(), peers.len(), "cycle must visit every peer");
}
