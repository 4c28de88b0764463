//! Sieve Transport - TCP publish/subscribe for frames
//!
//! Every output endpoint binds a [`Publisher`]; every source endpoint
//! connects a [`Subscriber`]. Multiple subscribers per publisher are
//! allowed.
//!
//! # Protocol
//!
//! Messages are framed with a 4-byte big-endian length prefix followed by a
//! 1-byte tag:
//!
//! ```text
//! [4 bytes: length][1 byte: tag][payload]
//! ```
//!
//! Control messages (hello, subscribe, ping, pong, eos) carry a small JSON
//! payload. Frame messages carry the two-part frame layout:
//!
//! ```text
//! [4 bytes: header length][JSON header][raw image bytes]
//! ```
//!
//! # Flow control
//!
//! - Non-ephemeral consumers each get a bounded outbox; when any outbox is
//!   full the publisher awaits, which is the backpressure path.
//! - Ephemeral consumers get a 1-deep drop-oldest slot; they can lose
//!   arbitrarily many frames but never reorder, and never hold the
//!   publisher back.
//! - Doubly-ephemeral consumers never send `subscribe` and are served from
//!   a lossy broadcast ring; the publisher keeps no per-consumer state for
//!   them.
//!
//! # Ordering
//!
//! Per (producer, topic) frames are delivered in publication order to every
//! non-ephemeral subscriber. Nothing is guaranteed across topics or across
//! producers.

mod backoff;
mod error;
mod publisher;
mod subscriber;
mod wire;

pub use backoff::Backoff;
pub use error::TransportError;
pub use publisher::{Publisher, PublisherConfig, PublisherStats};
pub use subscriber::{Subscriber, SubscriberConfig, SubscriberEvent, SubscribeKind};
pub use wire::{read_message, write_message, Hello, Message, MAX_MESSAGE_BYTES};

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Heartbeat interval between producer pings
pub const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Consecutive missed pongs before a consumer slot is closed
pub const MAX_MISSED_PONGS: u32 = 5;

/// Default bounded outbox depth per non-ephemeral consumer
pub const DEFAULT_OUTBOX_CAPACITY: usize = 8;
