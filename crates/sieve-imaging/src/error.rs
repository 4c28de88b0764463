//! Imaging error types

use thiserror::Error;

/// Errors raised by image transforms
#[derive(Debug, Error)]
pub enum ImagingError {
    /// A color string failed to parse
    #[error("invalid color '{0}', expected #rrggbb")]
    BadColor(String),

    /// Box coordinates fell outside the relative [0, 1] range
    #[error("invalid box geometry: {0}")]
    BadRect(String),

    /// Target dimensions were zero
    #[error("invalid target size {width}x{height}")]
    BadSize { width: u32, height: u32 },

    /// The buffer could not be reassembled into an image
    #[error(transparent)]
    Frame(#[from] sieve_protocol::FrameError),
}

impl ImagingError {
    /// Whether the pipeline continues after this error (it always does;
    /// the frame is forwarded untransformed)
    pub fn recoverable(&self) -> bool {
        true
    }
}
