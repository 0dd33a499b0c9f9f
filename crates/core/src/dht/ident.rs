#![warn(missing_docs)]
//! The modular identifier space of the ring.
//!
//! Every node id and data key is hashed onto an integer in `[0, 2^m)`,
//! where `m` is the configured identifier width. All ring reasoning is done
//! in terms of arcs of that circle: an arc from `start` to `end` with
//! independently open or closed endpoints, possibly wrapping through zero.
//! [RingSpace] bundles the width, the pluggable [KeyHasher] and the arc
//! membership test; it carries no other state and is cheap to clone.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

use crate::consts::MAX_RING_BITS;
use crate::consts::MIN_RING_BITS;
use crate::error::Error;
use crate::error::Result;

/// A point on the ring, reduced modulo `2^m`.
pub type Ident = u64;

/// The address of a peer as seen by other peers: its textual node id plus
/// the identifier the id hashes to. Finger rows and predecessor fields
/// store `NodeRef`s; a live peer is resolved through the registry at call
/// time. Equality is by node id; two distinct ids may legally collide on
/// the same identifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    id: Arc<str>,
    n: Ident,
}

impl NodeRef {
    /// Wrap an id and its identifier.
    pub fn new(id: impl Into<Arc<str>>, n: Ident) -> Self {
        Self { id: id.into(), n }
    }

    /// The node id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The identifier the node id hashes to.
    pub fn ident(&self) -> Ident {
        self.n
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.n)
    }
}

/// Maps arbitrary strings to raw `u64` values. Implementations must be
/// stable (same input, same output) and should spread inputs roughly
/// uniformly; [RingSpace::hash] reduces the result modulo `2^m`. The ring
/// protocol is correct for any implementation, which is why the hasher is
/// injectable: tests substitute a numeric hasher to place peers at exact
/// identifiers.
pub trait KeyHasher: Send + Sync {
    /// Digest `value` into a raw, unreduced hash.
    fn digest(&self, value: &str) -> u64;
}

/// Default [KeyHasher]: the first 7 bytes of a SHA-1 digest folded
/// little-endian. 7 bytes bound the usable identifier width to 56 bits.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha1Fold;

impl KeyHasher for Sha1Fold {
    fn digest(&self, value: &str) -> u64 {
        let digest = Sha1::digest(value.as_bytes());
        let mut bytes = [0u8; 8];
        bytes[..7].copy_from_slice(&digest[..7]);
        u64::from_le_bytes(bytes)
    }
}

/// An m-bit modular identifier space with a pluggable key hasher.
#[derive(Clone)]
pub struct RingSpace {
    bits: u8,
    hasher: Arc<dyn KeyHasher>,
}

impl fmt::Debug for RingSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RingSpace").field("bits", &self.bits).finish()
    }
}

impl RingSpace {
    /// Build a space of the given width with the default SHA-1 fold hasher.
    pub fn new(bits: u8) -> Result<Self> {
        Self::with_hasher(bits, Arc::new(Sha1Fold))
    }

    /// Build a space of the given width with a caller-supplied hasher.
    /// Widths outside `[2, 56]` are a fatal configuration error.
    pub fn with_hasher(bits: u8, hasher: Arc<dyn KeyHasher>) -> Result<Self> {
        if !(MIN_RING_BITS..=MAX_RING_BITS).contains(&bits) {
            return Err(Error::RingWidthOutOfRange(bits));
        }
        Ok(Self { bits, hasher })
    }

    /// The identifier width m.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// The number of points on the ring, `2^m`.
    pub fn size(&self) -> u64 {
        1u64 << self.bits
    }

    /// Hash a node id or data key onto the ring.
    pub fn hash(&self, value: &str) -> Ident {
        self.hasher.digest(value) % self.size()
    }

    /// Build the [NodeRef] of a node id.
    pub fn node_ref(&self, id: &str) -> NodeRef {
        NodeRef::new(id, self.hash(id))
    }

    /// Does `hash` lie on the arc from `start` to `end`? Endpoints are
    /// included or excluded per the two flags; `start > end` means the arc
    /// wraps through zero. All three inputs must already be reduced modulo
    /// `2^m`; passing anything else is a contract violation.
    ///
    /// Two fully open arcs are always empty even though the normalization
    /// below would claim otherwise: `(x, x+1)` between adjacent points, and
    /// its wrapped twin `(2^m - 1, 0)`.
    pub fn is_element_of(
        &self,
        hash: Ident,
        start: Ident,
        end: Ident,
        start_inclusive: bool,
        end_inclusive: bool,
    ) -> bool {
        let size = self.size();
        debug_assert!(hash < size && start < size && end < size);

        if !start_inclusive && !end_inclusive {
            if end > 0 && start == end - 1 {
                return false;
            }
            if start == size - 1 && end == 0 {
                return false;
            }
        }

        // Normalize to an equivalent closed interval, wrapping both bounds.
        let mut start = start;
        let mut end = end;
        if !start_inclusive {
            start += 1;
            if start == size {
                start = 0;
            }
        }
        if !end_inclusive {
            if end == 0 {
                end = size - 1;
            } else {
                end -= 1;
            }
        }

        in_ring_sector(hash, start, end)
    }
}

/// Closed-interval membership on the ring. When `start > end` the sector
/// crosses zero and membership means "past start or before end".
fn in_ring_sector(hash: Ident, start: Ident, end: Ident) -> bool {
    if start > end {
        hash >= start || hash <= end
    } else {
        hash >= start && hash <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(bits: u8) -> RingSpace {
        RingSpace::new(bits).unwrap()
    }

    #[test]
    fn test_width_validation() {
        assert!(RingSpace::new(2).is_ok());
        assert!(RingSpace::new(56).is_ok());
        assert!(matches!(
            RingSpace::new(1),
            Err(Error::RingWidthOutOfRange(1))
        ));
        assert!(matches!(
            RingSpace::new(0),
            Err(Error::RingWidthOutOfRange(0))
        ));
        assert!(matches!(
            RingSpace::new(57),
            Err(Error::RingWidthOutOfRange(57))
        ));
    }

    #[test]
    fn test_closed_start_open_end() {
        let s = space(3);
        // 5 is the closed start of [5, 6).
        assert!(s.is_element_of(5, 5, 6, true, false));
        assert!(!s.is_element_of(6, 5, 6, true, false));
    }

    #[test]
    fn test_wrap_through_zero() {
        let s = space(3);
        // (7, 2] contains 0, 1, 2 and nothing else.
        for hash in [0, 1, 2, 3] {
            assert_eq!(s.is_element_of(hash, 7, 2, false, true), hash <= 2);
        }
        assert!(!s.is_element_of(7, 7, 2, false, true));
    }

    #[test]
    fn test_open_adjacent_arc_is_empty() {
        let s = space(3);
        for hash in 0..8 {
            assert!(!s.is_element_of(hash, 4, 5, false, false));
        }
    }

    #[test]
    fn test_open_wrapped_adjacent_arc_is_empty() {
        let s = space(3);
        for hash in 0..8 {
            assert!(!s.is_element_of(hash, 7, 0, false, false));
        }
    }

    #[test]
    fn test_degenerate_arc_covers_ring() {
        let s = space(3);
        // (n, n] is the whole ring: walking clockwise from just past n all
        // the way around ends at n again.
        for hash in 0..8 {
            assert!(s.is_element_of(hash, 3, 3, false, true));
        }
        // (n, n) is everything but n itself.
        for hash in 0..8 {
            assert_eq!(s.is_element_of(hash, 3, 3, false, false), hash != 3);
        }
    }

    #[test]
    fn test_hash_is_stable_and_in_range() {
        let s = space(8);
        for value in ["Node_0", "Node_1", "alpha", "beta", ""] {
            let h = s.hash(value);
            assert!(h < s.size());
            assert_eq!(h, s.hash(value));
        }
    }

    #[test]
    fn test_default_hasher_known_values() {
        // SHA-1("Test") folded over 7 little-endian bytes.
        assert_eq!(Sha1Fold.digest("Test"), 66845774615546468);
        assert_eq!(space(24).hash("Test"), 11668068);
        assert_eq!(space(8).hash("Test"), 100);
        assert_eq!(space(3).hash("Test"), 4);
        assert_eq!(space(24).hash("Node_0"), 4494525);
    }

    #[test]
    fn test_node_ref() {
        let s = space(8);
        let node = s.node_ref("Node_0");
        assert_eq!(node.id(), "Node_0");
        assert_eq!(node.ident(), s.hash("Node_0"));
        assert_eq!(node, NodeRef::new("Node_0", node.ident()));
        assert_eq!(format!("{node}"), format!("Node_0@{}", node.ident()));
    }
}
