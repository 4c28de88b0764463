//! Sieve Protocol - Frame model and wire codec
//!
//! This crate provides the types that flow through a Sieve pipeline:
//! - `Data` - JSON-shaped metadata value with insertion-ordered maps
//! - `Frame` - one unit of dataflow: an optional image plus metadata
//! - `encode` / `decode` - the two-part wire codec (JSON header + raw pixels)
//!
//! # Design Principles
//!
//! - **Zero-copy**: image payloads live in `bytes::Bytes`; cloning a frame
//!   is O(1) and forwarding an untouched frame never copies pixels
//! - **Two-part framing**: the JSON header never contains pixel data, so
//!   serialization cost is independent of image size
//! - **Copy-on-write mutation**: `Image::into_mut` materialises an owned
//!   buffer only when the underlying storage is shared
//!
//! # Wire Format
//!
//! Each frame travels as one logical message with two parts:
//!
//! ```text
//! part 1: UTF-8 JSON header (<= 1 MiB)
//!   { "v":1, "topic":"main", "id":12345, "ts":1733200000000000000,
//!     "src":"detector", "img":{"h":480,"w":640,"c":3,"fmt":"BGR"},
//!     "meta":{ ... } }
//! part 2: raw image bytes, row-major, omitted entirely when img == null
//! ```

mod codec;
mod data;
mod error;
mod frame;

pub use codec::{decode, encode, EncodedFrame, MAX_HEADER_BYTES, WIRE_VERSION};
pub use data::{Data, DataMap};
pub use error::FrameError;
pub use frame::{Frame, Image, ImageMut, ImageShape, PixelFormat, META_KEY};

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, FrameError>;
