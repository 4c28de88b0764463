//! Frame - the atom of dataflow
//!
//! A frame carries an optional image payload plus a metadata map. The
//! runtime-owned fields (`id`, `ts`, `src`, `topic`, `fps`, latencies) live
//! in the reserved `meta` sub-map and have typed accessors here.

use bytes::{Bytes, BytesMut};

use crate::data::{Data, DataMap};
use crate::error::FrameError;

/// Reserved metadata key for runtime-inserted fields
pub const META_KEY: &str = "meta";

/// Pixel channel ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Blue-green-red, 3 channels (the pipeline default)
    Bgr,
    /// Red-green-blue, 3 channels
    Rgb,
    /// Single-channel luminance
    Gray,
}

impl PixelFormat {
    /// Number of channels implied by the format
    #[inline]
    pub fn channels(self) -> u8 {
        match self {
            PixelFormat::Bgr | PixelFormat::Rgb => 3,
            PixelFormat::Gray => 1,
        }
    }

    /// Wire tag for the header `img.fmt` field
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Bgr => "BGR",
            PixelFormat::Rgb => "RGB",
            PixelFormat::Gray => "GRAY",
        }
    }

    /// Parse a wire tag
    pub fn parse(tag: &str) -> Result<Self, FrameError> {
        match tag {
            "BGR" => Ok(PixelFormat::Bgr),
            "RGB" => Ok(PixelFormat::Rgb),
            "GRAY" => Ok(PixelFormat::Gray),
            other => Err(FrameError::UnknownPixelFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub height: u32,
    pub width: u32,
    pub channels: u8,
}

impl ImageShape {
    /// Total byte length of a contiguous row-major buffer with this shape
    ///
    /// Elements are 8-bit unsigned, so this is `h * w * c`.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.height as usize * self.width as usize * self.channels as usize
    }
}

/// An immutable image payload
///
/// Pixels are a contiguous row-major `Bytes` buffer, so cloning an image is
/// O(1) and frames forwarded untouched never copy pixel data.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    shape: ImageShape,
    format: PixelFormat,
    pixels: Bytes,
}

impl Image {
    /// Create an image, validating the buffer against the shape
    pub fn new(shape: ImageShape, format: PixelFormat, pixels: Bytes) -> Result<Self, FrameError> {
        if shape.channels != format.channels() {
            return Err(FrameError::ShapeMismatch {
                expected: shape.byte_len(),
                actual: shape.height as usize * shape.width as usize * format.channels() as usize,
            });
        }
        if pixels.len() != shape.byte_len() {
            return Err(FrameError::ShapeMismatch {
                expected: shape.byte_len(),
                actual: pixels.len(),
            });
        }
        Ok(Self {
            shape,
            format,
            pixels,
        })
    }

    /// Create an image from an owned pixel vector
    pub fn from_pixels(
        height: u32,
        width: u32,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let shape = ImageShape {
            height,
            width,
            channels: format.channels(),
        };
        Self::new(shape, format, Bytes::from(pixels))
    }

    /// Image dimensions
    #[inline]
    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    /// Image height in rows
    #[inline]
    pub fn height(&self) -> u32 {
        self.shape.height
    }

    /// Image width in columns
    #[inline]
    pub fn width(&self) -> u32 {
        self.shape.width
    }

    /// Channel count (1 or 3)
    #[inline]
    pub fn channels(&self) -> u8 {
        self.shape.channels
    }

    /// Channel ordering
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel buffer
    #[inline]
    pub fn pixels(&self) -> &Bytes {
        &self.pixels
    }

    /// One row of pixels
    ///
    /// # Panics
    ///
    /// Panics if `y` is out of bounds.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.shape.width as usize * self.shape.channels as usize;
        let start = y as usize * stride;
        &self.pixels[start..start + stride]
    }

    /// Convert into a mutable image for in-place edits
    ///
    /// Zero-copy when this image holds the only reference to its buffer;
    /// otherwise the pixels are copied once. This is the copy-on-write
    /// boundary: untouched frames are forwarded without ever paying it.
    pub fn into_mut(self) -> ImageMut {
        let pixels = match self.pixels.try_into_mut() {
            Ok(owned) => owned,
            Err(shared) => BytesMut::from(&shared[..]),
        };
        ImageMut {
            shape: self.shape,
            format: self.format,
            pixels,
        }
    }
}

/// A mutable image, produced by [`Image::into_mut`]
#[derive(Debug)]
pub struct ImageMut {
    shape: ImageShape,
    format: PixelFormat,
    pixels: BytesMut,
}

impl ImageMut {
    /// Image dimensions
    #[inline]
    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    /// Channel ordering
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Mutable pixel buffer
    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Freeze back into an immutable image
    #[inline]
    pub fn freeze(self) -> Image {
        Image {
            shape: self.shape,
            format: self.format,
            pixels: self.pixels.freeze(),
        }
    }
}

/// One unit of dataflow: an optional image plus metadata
///
/// # Runtime metadata
///
/// The reserved `meta` sub-map holds fields the runtime stamps on every
/// frame: `id`, `ts`, `src`, `topic`, `fps`, `lat_in`, `lat_out`. User code
/// reads them through the typed accessors and should treat them as owned by
/// the runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    image: Option<Image>,
    data: DataMap,
}

impl Frame {
    /// Create a frame from an image and metadata
    pub fn new(image: Option<Image>, data: DataMap) -> Self {
        Self { image, data }
    }

    /// Create an empty frame (no image, no metadata)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a metadata-only frame
    pub fn from_data(data: DataMap) -> Self {
        Self { image: None, data }
    }

    /// Create an image-only frame
    pub fn from_image(image: Image) -> Self {
        Self {
            image: Some(image),
            data: DataMap::new(),
        }
    }

    /// The image payload, if any
    #[inline]
    pub fn image(&self) -> Option<&Image> {
        self.image.as_ref()
    }

    /// True if the frame carries an image
    #[inline]
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Take the image out of the frame
    #[inline]
    pub fn take_image(&mut self) -> Option<Image> {
        self.image.take()
    }

    /// Replace the image payload
    #[inline]
    pub fn set_image(&mut self, image: Option<Image>) {
        self.image = image;
    }

    /// Replace the image, consuming self
    #[must_use]
    pub fn with_image(mut self, image: Option<Image>) -> Self {
        self.image = image;
        self
    }

    /// The metadata map
    #[inline]
    pub fn data(&self) -> &DataMap {
        &self.data
    }

    /// Mutable metadata map
    #[inline]
    pub fn data_mut(&mut self) -> &mut DataMap {
        &mut self.data
    }

    /// The reserved runtime sub-map, if present
    pub fn runtime_meta(&self) -> Option<&DataMap> {
        self.data.get(META_KEY).and_then(Data::as_map)
    }

    /// Set one field in the reserved runtime sub-map, creating it if needed
    pub fn set_meta_field(&mut self, key: &str, value: impl Into<Data>) {
        self.data.entry_map(META_KEY).insert(key, value);
    }

    /// Read one field from the reserved runtime sub-map
    pub fn meta_field(&self, key: &str) -> Option<&Data> {
        self.runtime_meta()?.get(key)
    }

    /// Frame sequence number (`meta.id`)
    pub fn id(&self) -> Option<i64> {
        self.meta_field("id")?.as_int()
    }

    /// Wall-clock timestamp in nanoseconds since epoch, UTC (`meta.ts`)
    pub fn ts(&self) -> Option<i64> {
        self.meta_field("ts")?.as_int()
    }

    /// Producing filter id (`meta.src`)
    pub fn src(&self) -> Option<&str> {
        self.meta_field("src")?.as_str()
    }

    /// Topic the frame travels on (`meta.topic`), defaulting to `main`
    pub fn topic(&self) -> &str {
        self.meta_field("topic")
            .and_then(Data::as_str)
            .unwrap_or("main")
    }

    /// Stamp the topic into the runtime sub-map
    pub fn set_topic(&mut self, topic: &str) {
        self.set_meta_field("topic", topic);
    }
}
