#![warn(missing_docs)]
//! Implementation of the simulator's DHT,
//! which is based on CHORD, ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>
//! With high probability, the number of nodes that must be contacted to find a successor in an N-node network is O(log N).

mod chord;
pub mod finger;
pub mod ident;
mod stabilization;
pub mod types;

pub use chord::ChordPeer;
pub use finger::FingerEntry;
pub use finger::FingerTable;
pub use ident::Ident;
pub use ident::KeyHasher;
pub use ident::NodeRef;
pub use ident::RingSpace;
pub use ident::Sha1Fold;
pub use stabilization::Stabilizer;
pub use types::Directory;
pub use types::RoutingMode;
