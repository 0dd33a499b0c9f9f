#![warn(missing_docs)]
//! DHT-facing types and the seam to the peer directory.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::chord::ChordPeer;
use crate::error::Result;
use crate::message::MessageLog;

/// How a peer resolves the owner of a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingMode {
    /// Linear successor chasing: O(N) hops, no finger table involved.
    /// Simple and always correct on a stabilized ring.
    SuccessorOnly,
    /// Finger-table accelerated routing: O(log N) hops once fingers are
    /// populated.
    FingerTable,
}

/// The directory a chord peer resolves other peers through. Every resolved
/// call is the in-process stand-in for an RPC; a real deployment would
/// replace resolution with a network transport. Implemented by the
/// network registry.
pub trait Directory: Send + Sync {
    /// Resolve a live chord peer by node id.
    fn chord_peer(&self, id: &str) -> Result<Arc<ChordPeer>>;

    /// The shared protocol-event log.
    fn message_log(&self) -> &MessageLog;
}
