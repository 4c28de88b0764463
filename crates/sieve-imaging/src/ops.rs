//! Buffer transforms: flips, rotations, conversion, drawing
//!
//! All operations allocate a fresh output buffer; the input image is
//! untouched (its pixels may be shared with frames still in flight).

use sieve_protocol::{Image, PixelFormat};

use crate::error::ImagingError;
use crate::Result;

/// Mirror horizontally (columns reversed)
pub fn flip_x(image: &Image) -> Image {
    let (h, w, c) = dims(image);
    let src = image.pixels();
    let mut dst = vec![0u8; src.len()];

    for y in 0..h {
        let row = y * w * c;
        for x in 0..w {
            let from = row + x * c;
            let to = row + (w - 1 - x) * c;
            dst[to..to + c].copy_from_slice(&src[from..from + c]);
        }
    }
    rebuild(image, image.height(), image.width(), dst)
}

/// Mirror vertically (rows reversed)
pub fn flip_y(image: &Image) -> Image {
    let (h, w, c) = dims(image);
    let src = image.pixels();
    let stride = w * c;
    let mut dst = vec![0u8; src.len()];

    for y in 0..h {
        let from = y * stride;
        let to = (h - 1 - y) * stride;
        dst[to..to + stride].copy_from_slice(&src[from..from + stride]);
    }
    rebuild(image, image.height(), image.width(), dst)
}

/// Rotate 180 degrees
pub fn flip_both(image: &Image) -> Image {
    let (h, w, c) = dims(image);
    let src = image.pixels();
    let mut dst = vec![0u8; src.len()];

    for y in 0..h {
        for x in 0..w {
            let from = (y * w + x) * c;
            let to = ((h - 1 - y) * w + (w - 1 - x)) * c;
            dst[to..to + c].copy_from_slice(&src[from..from + c]);
        }
    }
    rebuild(image, image.height(), image.width(), dst)
}

/// Rotate 90 degrees clockwise; output is `w × h`
pub fn rot_cw(image: &Image) -> Image {
    let (h, w, c) = dims(image);
    let src = image.pixels();
    let mut dst = vec![0u8; src.len()];

    // dst(y, x) = src(h-1-x, y), dst is w rows by h columns
    for y in 0..w {
        for x in 0..h {
            let from = ((h - 1 - x) * w + y) * c;
            let to = (y * h + x) * c;
            dst[to..to + c].copy_from_slice(&src[from..from + c]);
        }
    }
    rebuild(image, image.width(), image.height(), dst)
}

/// Rotate 90 degrees counter-clockwise; output is `w × h`
pub fn rot_ccw(image: &Image) -> Image {
    let (h, w, c) = dims(image);
    let src = image.pixels();
    let mut dst = vec![0u8; src.len()];

    // dst(y, x) = src(x, w-1-y)
    for y in 0..w {
        for x in 0..h {
            let from = (x * w + (w - 1 - y)) * c;
            let to = (y * h + x) * c;
            dst[to..to + c].copy_from_slice(&src[from..from + c]);
        }
    }
    rebuild(image, image.width(), image.height(), dst)
}

/// Convert between channel orderings
///
/// BGR↔RGB swaps the first and third channel; grayscale uses the BT.601
/// luminance weights; grayscale back to color replicates the channel.
pub fn convert_format(image: &Image, to: PixelFormat) -> Image {
    let from = image.format();
    if from == to {
        return image.clone();
    }

    let src = image.pixels();

    let dst: Vec<u8> = match (from, to) {
        (PixelFormat::Bgr, PixelFormat::Rgb) | (PixelFormat::Rgb, PixelFormat::Bgr) => src
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
        (PixelFormat::Bgr, PixelFormat::Gray) => src
            .chunks_exact(3)
            .map(|px| luminance(px[2], px[1], px[0]))
            .collect(),
        (PixelFormat::Rgb, PixelFormat::Gray) => src
            .chunks_exact(3)
            .map(|px| luminance(px[0], px[1], px[2]))
            .collect(),
        (PixelFormat::Gray, PixelFormat::Bgr) | (PixelFormat::Gray, PixelFormat::Rgb) => {
            src.iter().flat_map(|&v| [v, v, v]).collect()
        }
        _ => unreachable!("same-format handled above"),
    };

    Image::from_pixels(image.height(), image.width(), to, dst)
        .expect("conversion preserves pixel count")
}

#[inline]
fn luminance(r: u8, g: u8, b: u8) -> u8 {
    // BT.601 integer approximation.
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Parse a `#rrggbb` color into RGB bytes
pub fn parse_color(text: &str) -> Result<[u8; 3]> {
    let hex = text
        .strip_prefix('#')
        .ok_or_else(|| ImagingError::BadColor(text.to_string()))?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ImagingError::BadColor(text.to_string()));
    }
    let parse = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).unwrap_or(0);
    Ok([parse(0..2), parse(2..4), parse(4..6)])
}

/// Draw a solid-color box outline at relative coordinates
///
/// `x`, `y`, `w`, `h` are fractions of the image size in [0, 1]; the color
/// is RGB as parsed by [`parse_color`] and remapped to the image's channel
/// order. `thickness` is in pixels; `filled` paints the interior instead.
pub fn draw_box(
    image: &Image,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    rgb: [u8; 3],
    thickness: u32,
    filled: bool,
) -> Result<Image> {
    for (name, v) in [("x", x), ("y", y), ("w", w), ("h", h)] {
        if !(0.0..=1.0).contains(&v) {
            return Err(ImagingError::BadRect(format!("{name}={v} outside [0, 1]")));
        }
    }

    let (height, width, c) = dims(image);
    let color: Vec<u8> = match image.format() {
        PixelFormat::Rgb => rgb.to_vec(),
        PixelFormat::Bgr => vec![rgb[2], rgb[1], rgb[0]],
        PixelFormat::Gray => vec![luminance(rgb[0], rgb[1], rgb[2])],
    };

    let x0 = (x * width as f64).round() as usize;
    let y0 = (y * height as f64).round() as usize;
    let x1 = ((x + w) * width as f64).round().min(width as f64) as usize;
    let y1 = ((y + h) * height as f64).round().min(height as f64) as usize;
    let t = thickness.max(1) as usize;

    let mut dst = image.pixels().to_vec();
    for py in y0..y1 {
        for px in x0..x1 {
            let on_edge = py < y0 + t || py >= y1.saturating_sub(t) || px < x0 + t
                || px >= x1.saturating_sub(t);
            if filled || on_edge {
                let offset = (py * width + px) * c;
                dst[offset..offset + c].copy_from_slice(&color);
            }
        }
    }

    Ok(rebuild(image, image.height(), image.width(), dst))
}

#[inline]
fn dims(image: &Image) -> (usize, usize, usize) {
    (
        image.height() as usize,
        image.width() as usize,
        image.channels() as usize,
    )
}

fn rebuild(image: &Image, height: u32, width: u32, pixels: Vec<u8>) -> Image {
    Image::from_pixels(height, width, image.format(), pixels)
        .expect("transform preserves pixel count")
}
