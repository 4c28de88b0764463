//! Resizing through the image crate's sampling kernels

use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use sieve_protocol::{Image, PixelFormat};

use crate::error::ImagingError;
use crate::Result;

/// Sampling kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeKernel {
    Nearest,
    #[default]
    Bilinear,
    Cubic,
}

impl ResizeKernel {
    fn filter(self) -> FilterType {
        match self {
            ResizeKernel::Nearest => FilterType::Nearest,
            ResizeKernel::Bilinear => FilterType::Triangle,
            ResizeKernel::Cubic => FilterType::CatmullRom,
        }
    }
}

/// How the target rectangle is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    /// Exact target size, aspect ratio not preserved
    #[default]
    Stretch,
    /// Fit within the target, aspect ratio preserved; the output may be
    /// smaller than the target on one axis
    Contain,
}

/// Resize to `width × height` with the given kernel and mode
pub fn resize(
    image: &Image,
    width: u32,
    height: u32,
    kernel: ResizeKernel,
    mode: ResizeMode,
) -> Result<Image> {
    if width == 0 || height == 0 {
        return Err(ImagingError::BadSize { width, height });
    }

    let (target_w, target_h) = match mode {
        ResizeMode::Stretch => (width, height),
        ResizeMode::Contain => contain_size(image.width(), image.height(), width, height),
    };
    if target_w == image.width() && target_h == image.height() {
        return Ok(image.clone());
    }

    let pixels = image.pixels().to_vec();
    let resized: Vec<u8> = match image.format() {
        PixelFormat::Gray => {
            let buffer = GrayImage::from_raw(image.width(), image.height(), pixels)
                .expect("image shape is validated at construction");
            image::imageops::resize(&buffer, target_w, target_h, kernel.filter()).into_raw()
        }
        // The kernel is channel-agnostic; BGR resizes as RGB unchanged.
        PixelFormat::Bgr | PixelFormat::Rgb => {
            let buffer = RgbImage::from_raw(image.width(), image.height(), pixels)
                .expect("image shape is validated at construction");
            image::imageops::resize(&buffer, target_w, target_h, kernel.filter()).into_raw()
        }
    };

    Ok(Image::from_pixels(target_h, target_w, image.format(), resized)?)
}

/// Only scale down, preserving aspect ratio, if larger than the bound
pub fn maxsize(image: &Image, width: u32, height: u32, kernel: ResizeKernel) -> Result<Image> {
    if width == 0 || height == 0 {
        return Err(ImagingError::BadSize { width, height });
    }
    if image.width() <= width && image.height() <= height {
        return Ok(image.clone());
    }
    resize(image, width, height, kernel, ResizeMode::Contain)
}

/// Only scale up, preserving aspect ratio, if smaller than the bound
pub fn minsize(image: &Image, width: u32, height: u32, kernel: ResizeKernel) -> Result<Image> {
    if width == 0 || height == 0 {
        return Err(ImagingError::BadSize { width, height });
    }
    if image.width() >= width && image.height() >= height {
        return Ok(image.clone());
    }
    // Scale so both axes reach at least the bound, preserving aspect.
    let scale_w = width as f64 / image.width() as f64;
    let scale_h = height as f64 / image.height() as f64;
    let scale = scale_w.max(scale_h);
    let target_w = ((image.width() as f64 * scale).round() as u32).max(1);
    let target_h = ((image.height() as f64 * scale).round() as u32).max(1);
    resize(image, target_w, target_h, kernel, ResizeMode::Stretch)
}

fn contain_size(src_w: u32, src_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let scale_w = max_w as f64 / src_w as f64;
    let scale_h = max_h as f64 / src_h as f64;
    let scale = scale_w.min(scale_h);
    (
        ((src_w as f64 * scale).round() as u32).max(1),
        ((src_h as f64 * scale).round() as u32).max(1),
    )
}
