//! ringlab-core simulates a structured peer-to-peer overlay running the
//! Chord distributed hash table protocol: a ring of peers in an m-bit
//! modular identifier space, each holding a logarithmic finger table,
//! resolving key ownership in O(log N) hops and keeping its routing state
//! consistent through a continuous join/stabilize/notify protocol. A
//! trivial fully connected overlay sits next to the ring as the
//! no-routing baseline.
//!
//! Remote procedure calls between peers are modeled as direct synchronous
//! calls resolved through the shared registry; each one is conceptually a
//! protocol message and is recorded as such in the message history. A
//! port to a real deployment would replace registry resolution with a
//! network transport, and must then add the failure handling (timeouts,
//! unreachable peers, message loss) that this in-process simulation gets
//! to ignore, since a resolved call here always succeeds.

pub mod consts;
pub mod dht;
pub mod error;
pub mod inspect;
pub mod message;
pub mod network;
pub mod storage;

pub use error::Error;
pub use error::Result;
