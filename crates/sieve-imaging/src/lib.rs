//! Sieve Imaging - pure frame transforms
//!
//! Flips, rotations, resizing, channel-order conversion and box drawing
//! over the raw frame buffers. Nothing here touches the transport or the
//! runtime; filters compose these per tick, optionally gated by a
//! [`TopicPredicate`] so only selected topics are rewritten.
//!
//! Algebraic properties the tests pin down:
//! - `flip_x ∘ flip_x` is the identity (same for `flip_y`)
//! - `rot_cw` four times is the identity
//! - `resize(w, h)` is idempotent at the same size

mod error;
mod ops;
mod predicate;
mod resize;

pub use error::ImagingError;
pub use ops::{convert_format, draw_box, flip_both, flip_x, flip_y, parse_color, rot_ccw, rot_cw};
pub use predicate::TopicPredicate;
pub use resize::{maxsize, minsize, resize, ResizeKernel, ResizeMode};

/// Result type for imaging operations
pub type Result<T> = std::result::Result<T, ImagingError>;

// Test modules - only compiled during testing
#[cfg(test)]
mod ops_test;
#[cfg(test)]
mod resize_test;
