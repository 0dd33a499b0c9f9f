//! Ring maintenance: joins, stabilization convergence and finger repair.

mod common;

use common::assert_successor_cycle;
use common::manual_chord_network;
use common::stabilize_round;
use common::stabilize_to_fixpoint;
use ringlab_core::dht::RoutingMode;
use ringlab_core::network::Network;
use ringlab_core::network::NetworkConfig;
use ringlab_core::Error;

#[test]
fn test_invalid_ring_width_is_fatal() {
    assert!(matches!(
        Network::new(NetworkConfig::chord(1, RoutingMode::FingerTable)),
        Err(Error::RingWidthOutOfRange(1))
    ));
    assert!(matches!(
        Network::new(NetworkConfig::chord(60, RoutingMode::FingerTable)),
        Err(Error::RingWidthOutOfRange(60))
    ));
}

#[test]
fn test_single_peer_ring() {
    for routing in [RoutingMode::SuccessorOnly, RoutingMode::FingerTable] {
        let network = manual_chord_network(3, routing);
        let peer = network.create_peer("1").unwrap();
        let chord = peer.as_chord().unwrap();

        assert_eq!(chord.successor_snapshot().unwrap().id(), "1");
        assert_eq!(chord.predecessor_snapshot().unwrap().id(), "1");

        // the lone peer owns every key
        for key in ["0", "1", "5", "7"] {
            let owner = peer.lookup_node_for_item(None, key).unwrap();
            assert_eq!(owner.id(), "1");
        }
    }
}

#[test]
fn test_duplicate_peer_is_rejected() {
    let network = manual_chord_network(3, RoutingMode::SuccessorOnly);
    network.create_peer("1").unwrap();
    assert!(matches!(
        network.create_peer("1"),
        Err(Error::DuplicatePeer(_))
    ));
}

/// Ring of 8, peers at 1, 3 and 6 joining in that order. After each
/// insertion every live peer runs one stabilize round; the notify cascade
/// then has all pointers around the newcomer correct already.
#[test]
fn test_join_convergence_one_three_six() {
    let network = manual_chord_network(3, RoutingMode::SuccessorOnly);
    let mut peers = Vec::new();

    for id in ["1", "3", "6"] {
        peers.push(network.create_peer(id).unwrap());
        stabilize_round(&peers);
    }

    let expected: Vec<(String, String, String)> = [("1", "3", "6"), ("3", "6", "1"), ("6", "1", "3")]
        .iter()
        .map(|(id, successor, predecessor)| {
            (id.to_string(), successor.to_string(), predecessor.to_string())
        })
        .collect();
    assert_eq!(common::pointer_state(&peers), expected);
}

#[test]
fn test_successor_pointers_form_a_cycle() {
    let network = manual_chord_network(8, RoutingMode::SuccessorOnly);
    let ids = ["10", "50", "90", "200", "250", "5"];
    let peers: Vec<_> = ids
        .iter()
        .map(|id| network.create_peer(id).unwrap())
        .collect();

    stabilize_to_fixpoint(&peers);
    assert_successor_cycle(&network, &peers);

    // predecessors mirror the successor cycle once stable
    for peer in &peers {
        let chord = peer.as_chord().unwrap();
        let successor = chord.successor_snapshot().unwrap();
        let back = network
            .peer(successor.id())
            .unwrap()
            .as_chord()
            .unwrap()
            .predecessor_snapshot()
            .unwrap();
        assert_eq!(back.id(), peer.id());
    }
}

#[test]
fn test_fix_fingers_fills_correct_owners() {
    let network = manual_chord_network(3, RoutingMode::FingerTable);
    let peers: Vec<_> = ["1", "3", "6"]
        .iter()
        .map(|id| network.create_peer(id).unwrap())
        .collect();
    stabilize_to_fixpoint(&peers);

    network.fix_all_fingers().unwrap();

    // peer 1 rows start at 2, 3, 5; their ring successors are 3, 3 and 6
    let fingers = peers[0].as_chord().unwrap().finger_snapshot().unwrap();
    let owners: Vec<Option<String>> = fingers
        .iter()
        .map(|entry| entry.node().map(|node| node.id().to_string()))
        .collect();
    assert_eq!(
        owners,
        vec![
            Some("3".to_string()),
            Some("3".to_string()),
            Some("6".to_string())
        ]
    );
}

#[test]
fn test_fix_fingers_is_idempotent() {
    let network = manual_chord_network(3, RoutingMode::FingerTable);
    let peers: Vec<_> = ["1", "3", "6"]
        .iter()
        .map(|id| network.create_peer(id).unwrap())
        .collect();
    stabilize_to_fixpoint(&peers);

    network.fix_all_fingers().unwrap();
    let first: Vec<_> = peers
        .iter()
        .map(|peer| peer.as_chord().unwrap().finger_snapshot().unwrap())
        .collect();

    network.fix_all_fingers().unwrap();
    let second: Vec<_> = peers
        .iter()
        .map(|peer| peer.as_chord().unwrap().finger_snapshot().unwrap())
        .collect();

    assert_eq!(first, second);
}

#[test]
fn test_fix_fingers_indices_are_clamped() {
    let network = manual_chord_network(3, RoutingMode::FingerTable);
    let peers: Vec<_> = ["1", "3"]
        .iter()
        .map(|id| network.create_peer(id).unwrap())
        .collect();
    stabilize_to_fixpoint(&peers);

    // way out of range on both ends, must neither panic nor error
    network.fix_fingers("1", 0, 999).unwrap();
    network.fix_fingers("1", 500, 999).unwrap();
}
