//! Error of ringlab-core.

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in ringlab-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("ring identifier width {0} is outside the supported range [2, 56]")]
    RingWidthOutOfRange(u8),

    #[error("a peer with id {0} is already registered")]
    DuplicatePeer(String),

    #[error("no peer registered under id {0}")]
    PeerNotFound(String),

    #[error("peer {0} does not speak the chord protocol")]
    NotAChordPeer(String),

    #[error("the network this peer belongs to has been dropped")]
    NetworkDropped,

    #[error("automatic stabilization requires a running tokio runtime")]
    NoAsyncRuntime,

    #[error("sync lock poisoned")]
    SyncLockPoisoned,
}
