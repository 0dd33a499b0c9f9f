//! Stabilization run daemons to maintain the ring.

use std::sync::Arc;
use std::time::Duration;

use futures_timer::Delay;

use crate::dht::chord::ChordPeer;

/// The stabilization runner of a single peer. Each joined peer gets its
/// own runner on its own schedule; runners are deliberately not
/// synchronized with each other.
pub struct Stabilizer {
    peer: Arc<ChordPeer>,
}

impl Stabilizer {
    /// Create a new stabilization runner.
    pub fn new(peer: Arc<ChordPeer>) -> Self {
        Self { peer }
    }

    /// Run stabilization in a loop, first round immediately and then one
    /// per interval. A failed round is logged and the loop carries on.
    pub async fn run(self, interval: Duration) {
        loop {
            let me = self.peer.node_ref();
            if let Err(e) = self.peer.stabilize(Some(&me)) {
                tracing::error!("failed to stabilize {}: {:?}", me, e);
            }
            Delay::new(interval).await;
        }
    }
}
