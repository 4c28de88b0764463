//! Tests for resizing

use sieve_protocol::{Image, PixelFormat};

use crate::resize::{maxsize, minsize, resize, ResizeKernel, ResizeMode};

fn gradient(width: u32, height: u32) -> Image {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let v = ((x + y) % 256) as u8;
            pixels.extend_from_slice(&[v, v, v]);
        }
    }
    Image::from_pixels(height, width, PixelFormat::Bgr, pixels).unwrap()
}

// =============================================================================
// Stretch
// =============================================================================

#[test]
fn test_stretch_hits_exact_size() {
    let image = gradient(8, 6);
    let resized = resize(&image, 4, 3, ResizeKernel::Bilinear, ResizeMode::Stretch).unwrap();
    assert_eq!(resized.width(), 4);
    assert_eq!(resized.height(), 3);
    assert_eq!(resized.pixels().len(), 4 * 3 * 3);
}

#[test]
fn test_resize_same_size_is_identity() {
    let image = gradient(8, 6);
    let resized = resize(&image, 8, 6, ResizeKernel::Bilinear, ResizeMode::Stretch).unwrap();
    assert_eq!(resized.pixels(), image.pixels());
}

#[test]
fn test_resize_is_idempotent_at_same_size() {
    let image = gradient(9, 7);
    let once = resize(&image, 5, 4, ResizeKernel::Bilinear, ResizeMode::Stretch).unwrap();
    let twice = resize(&once, 5, 4, ResizeKernel::Bilinear, ResizeMode::Stretch).unwrap();
    assert_eq!(once.pixels(), twice.pixels());
}

#[test]
fn test_all_kernels_produce_target_shape() {
    let image = gradient(10, 10);
    for kernel in [
        ResizeKernel::Nearest,
        ResizeKernel::Bilinear,
        ResizeKernel::Cubic,
    ] {
        let resized = resize(&image, 7, 3, kernel, ResizeMode::Stretch).unwrap();
        assert_eq!((resized.width(), resized.height()), (7, 3), "{kernel:?}");
    }
}

#[test]
fn test_gray_resizes() {
    let image = Image::from_pixels(4, 4, PixelFormat::Gray, vec![128; 16]).unwrap();
    let resized = resize(&image, 2, 2, ResizeKernel::Nearest, ResizeMode::Stretch).unwrap();
    assert_eq!(resized.channels(), 1);
    assert_eq!(resized.pixels().len(), 4);
    assert_eq!(resized.pixels()[0], 128);
}

#[test]
fn test_zero_size_rejected() {
    let image = gradient(4, 4);
    assert!(resize(&image, 0, 4, ResizeKernel::Nearest, ResizeMode::Stretch).is_err());
}

// =============================================================================
// Contain
// =============================================================================

#[test]
fn test_contain_preserves_aspect() {
    // 16:9 source fitted into a square box lands on the width.
    let image = gradient(160, 90);
    let resized = resize(&image, 80, 80, ResizeKernel::Bilinear, ResizeMode::Contain).unwrap();
    assert_eq!(resized.width(), 80);
    assert_eq!(resized.height(), 45);
}

// =============================================================================
// Bounds
// =============================================================================

#[test]
fn test_maxsize_only_shrinks() {
    let large = gradient(100, 50);
    let bounded = maxsize(&large, 40, 40, ResizeKernel::Bilinear).unwrap();
    assert_eq!(bounded.width(), 40);
    assert_eq!(bounded.height(), 20);

    let small = gradient(20, 10);
    let untouched = maxsize(&small, 40, 40, ResizeKernel::Bilinear).unwrap();
    assert_eq!(untouched.pixels().as_ptr(), small.pixels().as_ptr());
}

#[test]
fn test_minsize_only_grows() {
    let small = gradient(20, 10);
    let grown = minsize(&small, 40, 40, ResizeKernel::Bilinear).unwrap();
    // Both axes reach at least the bound; aspect preserved.
    assert!(grown.width() >= 40 && grown.height() >= 40);
    assert_eq!(grown.width() * 10, grown.height() * 20);

    let large = gradient(100, 50);
    let untouched = minsize(&large, 40, 40, ResizeKernel::Bilinear).unwrap();
    assert_eq!(untouched.pixels().as_ptr(), large.pixels().as_ptr());
}
