#![warn(missing_docs)]
//! Structured protocol-event history.
//!
//! Every cross-peer call is recorded as a request/response pair of events
//! for the external visualization and for traffic statistics. Calls a peer
//! makes to itself are not recorded; they never cross a process boundary.

use std::sync::Mutex;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::dht::ident::NodeRef;

/// The kinds of protocol events, one request/response pair per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Read a data item at a peer.
    Get,
    /// Response of [MessageKind::Get].
    GetResponse,
    /// Store a data item at a peer.
    Set,
    /// Response of [MessageKind::Set].
    SetResponse,
    /// Resolve the peer owning a key.
    Lookup,
    /// Response of [MessageKind::Lookup].
    LookupResponse,
    /// Read a peer's successor pointer.
    GetSuccessor,
    /// Response of [MessageKind::GetSuccessor].
    GetSuccessorResponse,
    /// Read a peer's predecessor pointer.
    GetPredecessor,
    /// Response of [MessageKind::GetPredecessor].
    GetPredecessorResponse,
    /// Overwrite a peer's predecessor pointer.
    SetPredecessor,
    /// Response of [MessageKind::SetPredecessor].
    SetPredecessorResponse,
    /// Ask a peer for the successor of an identifier.
    FindSuccessor,
    /// Response of [MessageKind::FindSuccessor].
    FindSuccessorResponse,
    /// Ask a peer for the predecessor of an identifier.
    FindPredecessor,
    /// Response of [MessageKind::FindPredecessor].
    FindPredecessorResponse,
    /// Ask a peer for its closest finger preceding an identifier.
    ClosestPrecedingFinger,
    /// Response of [MessageKind::ClosestPrecedingFinger].
    ClosestPrecedingFingerResponse,
    /// Tell a peer about a possible predecessor.
    Notify,
    /// Response of [MessageKind::Notify].
    NotifyResponse,
    /// Trigger a stabilization round on a peer.
    Stabilize,
    /// Response of [MessageKind::Stabilize].
    StabilizeResponse,
}

/// One recorded protocol event. A missing source or destination means the
/// client application rather than a peer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Event kind.
    pub kind: MessageKind,
    /// Sender node id, absent for the client.
    pub source: Option<String>,
    /// Receiver node id, absent for the client.
    pub destination: Option<String>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let source = self.source.as_deref().unwrap_or("client");
        let destination = self.destination.as_deref().unwrap_or("client");
        write!(
            f,
            "{} {:?} {} -> {}",
            self.timestamp, self.kind, source, destination
        )
    }
}

/// Shared, append-only history of protocol events.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Mutex<Vec<Message>>,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event. Events whose source and destination are the same
    /// peer are dropped.
    pub fn record(&self, kind: MessageKind, source: Option<&NodeRef>, destination: Option<&NodeRef>) {
        if let (Some(source), Some(destination)) = (source, destination) {
            if source.id() == destination.id() {
                return;
            }
        }
        let message = Message {
            kind,
            source: source.map(|node| node.id().to_string()),
            destination: destination.map(|node| node.id().to_string()),
            timestamp: Utc::now(),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(message);
        }
    }

    /// Copy of the recorded history.
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of recorded events of one kind.
    pub fn count_of(&self, kind: MessageKind) -> usize {
        self.entries
            .lock()
            .map(|e| e.iter().filter(|m| m.kind == kind).count())
            .unwrap_or_default()
    }

    /// Total number of recorded events.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget the recorded history.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
