//! Transport error types

use thiserror::Error;

/// Errors surfaced by the pub/sub transport
///
/// Transport faults on a single peer are recoverable: the peer slot is
/// recycled and the pipeline continues.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A connected peer vanished or stopped answering heartbeats
    #[error("peer gone: {addr}")]
    PeerGone { addr: String },

    /// The hello/subscribe exchange did not complete
    #[error("handshake failed: {reason}")]
    HandshakeFailed { reason: String },

    /// A wire message failed to decode
    #[error("wire decode failed: {reason}")]
    WireDecode { reason: String },

    /// A message exceeded the frame size cap
    #[error("message is {size} bytes, limit is {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    /// Frame-level failure (oversized header, shape mismatch, ...)
    #[error(transparent)]
    Frame(#[from] sieve_protocol::FrameError),

    /// Socket-level failure
    #[error("transport io: {0}")]
    Io(#[from] std::io::Error),

    /// The endpoint was shut down
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Whether the pipeline continues after this error
    ///
    /// Everything except explicit shutdown is a per-peer fault.
    pub fn recoverable(&self) -> bool {
        !matches!(self, TransportError::Closed)
    }
}
