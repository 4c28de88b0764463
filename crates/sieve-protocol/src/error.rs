//! Frame error types

use thiserror::Error;

/// Errors raised while building, encoding or decoding frames
///
/// Every variant is recoverable at the pipeline level: the offending frame
/// is dropped, a counter is incremented, and processing continues.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Header JSON exceeds the 1 MiB cap
    #[error("frame header is {size} bytes, limit is {limit}")]
    HeaderTooLarge { size: usize, limit: usize },

    /// Image byte count does not match `h * w * c`
    #[error("image shape implies {expected} bytes, buffer has {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Header JSON failed to parse
    #[error("failed to decode frame header: {0}")]
    InvalidHeader(#[from] serde_json::Error),

    /// Header declares a wire version this build does not speak
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u32),

    /// Unrecognized `img.fmt` tag
    #[error("unknown pixel format '{0}'")]
    UnknownPixelFormat(String),

    /// Header declares an image but the message has no image part
    #[error("header declares an image but the message carries no image part")]
    MissingImagePart,

    /// Message carries an image part the header does not declare
    #[error("message carries an image part but the header declares none")]
    UnexpectedImagePart,
}

impl FrameError {
    /// Whether the pipeline continues after this error
    ///
    /// Frame errors always drop only the offending frame.
    pub fn recoverable(&self) -> bool {
        true
    }
}
