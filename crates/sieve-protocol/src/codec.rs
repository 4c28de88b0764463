//! Wire codec - two-part frame encoding
//!
//! Part 1 is a UTF-8 JSON header; part 2 is the raw pixel buffer, omitted
//! when the frame has no image. Keeping pixels out of the JSON makes header
//! cost independent of image size, and decoding wraps the received buffer
//! without copying it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::data::{Data, DataMap};
use crate::error::FrameError;
use crate::frame::{Frame, Image, ImageShape, PixelFormat};

/// Wire format version spoken by this build
pub const WIRE_VERSION: u32 = 1;

/// Maximum header size; larger headers fail the frame
pub const MAX_HEADER_BYTES: usize = 1024 * 1024;

/// The two wire parts of an encoded frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// JSON header bytes
    pub header: Bytes,
    /// Raw pixel buffer, present iff the header declares an image
    pub image: Option<Bytes>,
}

#[derive(Serialize, Deserialize)]
struct WireImage {
    h: u32,
    w: u32,
    c: u8,
    fmt: String,
}

#[derive(Serialize, Deserialize)]
struct WireHeader {
    v: u32,
    topic: String,
    #[serde(default)]
    id: i64,
    #[serde(default)]
    ts: i64,
    #[serde(default)]
    src: String,
    img: Option<WireImage>,
    #[serde(default)]
    meta: Data,
}

/// Encode a frame into its two wire parts
///
/// Routing fields are lifted from the reserved `meta` sub-map into the
/// header top level; the full metadata map travels under `meta` with key
/// order preserved. The image buffer is reference-counted, so encoding
/// never copies pixels.
pub fn encode(frame: &Frame) -> Result<EncodedFrame, FrameError> {
    let header = WireHeader {
        v: WIRE_VERSION,
        topic: frame.topic().to_string(),
        id: frame.id().unwrap_or(0),
        ts: frame.ts().unwrap_or(0),
        src: frame.src().unwrap_or("").to_string(),
        img: frame.image().map(|img| WireImage {
            h: img.height(),
            w: img.width(),
            c: img.channels(),
            fmt: img.format().as_str().to_string(),
        }),
        meta: Data::Map(frame.data().clone()),
    };

    let header_bytes = serde_json::to_vec(&header)?;
    if header_bytes.len() > MAX_HEADER_BYTES {
        return Err(FrameError::HeaderTooLarge {
            size: header_bytes.len(),
            limit: MAX_HEADER_BYTES,
        });
    }

    Ok(EncodedFrame {
        header: Bytes::from(header_bytes),
        image: frame.image().map(|img| img.pixels().clone()),
    })
}

/// Decode a frame from its two wire parts
///
/// The image buffer is wrapped, not copied; the resulting frame shares it.
/// Shape validation rejects messages whose pixel count disagrees with the
/// declared `h * w * c`.
pub fn decode(header: Bytes, image: Option<Bytes>) -> Result<Frame, FrameError> {
    if header.len() > MAX_HEADER_BYTES {
        return Err(FrameError::HeaderTooLarge {
            size: header.len(),
            limit: MAX_HEADER_BYTES,
        });
    }

    let header: WireHeader = serde_json::from_slice(&header)?;
    if header.v != WIRE_VERSION {
        return Err(FrameError::UnsupportedVersion(header.v));
    }

    let decoded_image = match (header.img, image) {
        (Some(img), Some(pixels)) => {
            let format = PixelFormat::parse(&img.fmt)?;
            let shape = ImageShape {
                height: img.h,
                width: img.w,
                channels: img.c,
            };
            if shape.byte_len() != pixels.len() {
                return Err(FrameError::ShapeMismatch {
                    expected: shape.byte_len(),
                    actual: pixels.len(),
                });
            }
            Some(Image::new(shape, format, pixels)?)
        }
        (Some(img), None) => {
            let format = PixelFormat::parse(&img.fmt)?;
            let shape = ImageShape {
                height: img.h,
                width: img.w,
                channels: img.c,
            };
            // A declared zero-area image legitimately has no second part.
            if shape.byte_len() != 0 {
                return Err(FrameError::MissingImagePart);
            }
            Some(Image::new(shape, format, Bytes::new())?)
        }
        (None, Some(_)) => return Err(FrameError::UnexpectedImagePart),
        (None, None) => None,
    };

    let mut data = match header.meta {
        Data::Map(map) => map,
        Data::Null => DataMap::new(),
        other => {
            // A non-map meta is malformed; keep the value under a key
            // rather than dropping it silently.
            let mut map = DataMap::new();
            map.insert("value", other);
            map
        }
    };

    // Header routing fields win over whatever the meta sub-map carried.
    let meta = data.entry_map(crate::frame::META_KEY);
    meta.insert("topic", header.topic.as_str());
    meta.insert("id", header.id);
    meta.insert("ts", header.ts);
    if !header.src.is_empty() {
        meta.insert("src", header.src.as_str());
    }

    Ok(Frame::new(decoded_image, data))
}
