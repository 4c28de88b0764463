//! Tests for buffer transforms
//!
//! Pins the algebraic laws: double flips are identity, four clockwise
//! rotations are identity, conversions preserve pixel counts.

use sieve_protocol::{DataMap, Frame, Image, PixelFormat};

use crate::ops::{
    convert_format, draw_box, flip_both, flip_x, flip_y, parse_color, rot_ccw, rot_cw,
};
use crate::predicate::TopicPredicate;

/// 2x3 BGR test card with distinct pixels
fn card() -> Image {
    #[rustfmt::skip]
    let pixels = vec![
        10, 11, 12,  20, 21, 22,  30, 31, 32,
        40, 41, 42,  50, 51, 52,  60, 61, 62,
    ];
    Image::from_pixels(2, 3, PixelFormat::Bgr, pixels).unwrap()
}

fn pixel(image: &Image, y: u32, x: u32) -> &[u8] {
    let c = image.channels() as usize;
    let offset = (y as usize * image.width() as usize + x as usize) * c;
    &image.pixels()[offset..offset + c]
}

// =============================================================================
// Flips
// =============================================================================

#[test]
fn test_flip_x_reverses_columns() {
    let flipped = flip_x(&card());
    assert_eq!(pixel(&flipped, 0, 0), &[30, 31, 32]);
    assert_eq!(pixel(&flipped, 0, 2), &[10, 11, 12]);
    assert_eq!(pixel(&flipped, 1, 1), &[50, 51, 52]);
}

#[test]
fn test_flip_y_reverses_rows() {
    let flipped = flip_y(&card());
    assert_eq!(pixel(&flipped, 0, 0), &[40, 41, 42]);
    assert_eq!(pixel(&flipped, 1, 0), &[10, 11, 12]);
}

#[test]
fn test_double_flip_is_identity() {
    let image = card();
    assert_eq!(flip_x(&flip_x(&image)).pixels(), image.pixels());
    assert_eq!(flip_y(&flip_y(&image)).pixels(), image.pixels());
    assert_eq!(flip_both(&flip_both(&image)).pixels(), image.pixels());
}

#[test]
fn test_flip_both_equals_flip_x_then_y() {
    let image = card();
    assert_eq!(flip_both(&image).pixels(), flip_y(&flip_x(&image)).pixels());
}

// =============================================================================
// Rotations
// =============================================================================

#[test]
fn test_rot_cw_geometry() {
    let rotated = rot_cw(&card());
    // 2x3 becomes 3x2; the old bottom-left is the new top-left.
    assert_eq!(rotated.height(), 3);
    assert_eq!(rotated.width(), 2);
    assert_eq!(pixel(&rotated, 0, 0), &[40, 41, 42]);
    assert_eq!(pixel(&rotated, 0, 1), &[10, 11, 12]);
    assert_eq!(pixel(&rotated, 2, 1), &[30, 31, 32]);
}

#[test]
fn test_four_rotations_are_identity() {
    let image = card();
    let once = rot_cw(&image);
    let twice = rot_cw(&once);
    let thrice = rot_cw(&twice);
    let full = rot_cw(&thrice);
    assert_eq!(full.pixels(), image.pixels());
    assert_eq!(full.shape(), image.shape());
}

#[test]
fn test_ccw_undoes_cw() {
    let image = card();
    assert_eq!(rot_ccw(&rot_cw(&image)).pixels(), image.pixels());
}

#[test]
fn test_cw_equals_three_ccw() {
    let image = card();
    let ccw3 = rot_ccw(&rot_ccw(&rot_ccw(&image)));
    assert_eq!(rot_cw(&image).pixels(), ccw3.pixels());
}

// =============================================================================
// Format conversion
// =============================================================================

#[test]
fn test_bgr_rgb_swap_round_trips() {
    let image = card();
    let rgb = convert_format(&image, PixelFormat::Rgb);
    assert_eq!(pixel(&rgb, 0, 0), &[12, 11, 10]);

    let back = convert_format(&rgb, PixelFormat::Bgr);
    assert_eq!(back.pixels(), image.pixels());
}

#[test]
fn test_to_gray_shape_and_weighting() {
    let white = Image::from_pixels(1, 2, PixelFormat::Bgr, vec![255; 6]).unwrap();
    let gray = convert_format(&white, PixelFormat::Gray);
    assert_eq!(gray.channels(), 1);
    assert_eq!(gray.pixels().len(), 2);
    // White stays white (integer luminance rounds to 255).
    assert!(gray.pixels()[0] >= 254);
}

#[test]
fn test_gray_to_color_replicates() {
    let gray = Image::from_pixels(1, 2, PixelFormat::Gray, vec![9, 200]).unwrap();
    let bgr = convert_format(&gray, PixelFormat::Bgr);
    assert_eq!(bgr.pixels().as_ref(), &[9, 9, 9, 200, 200, 200]);
}

#[test]
fn test_same_format_is_noop() {
    let image = card();
    let same = convert_format(&image, PixelFormat::Bgr);
    assert_eq!(same.pixels().as_ptr(), image.pixels().as_ptr());
}

// =============================================================================
// Colors and boxes
// =============================================================================

#[test]
fn test_parse_color() {
    assert_eq!(parse_color("#ff0080").unwrap(), [0xFF, 0x00, 0x80]);
    assert_eq!(parse_color("#000000").unwrap(), [0, 0, 0]);
    assert!(parse_color("ff0080").is_err());
    assert!(parse_color("#ff008").is_err());
    assert!(parse_color("#gg0080").is_err());
}

#[test]
fn test_draw_box_filled() {
    let black = Image::from_pixels(4, 4, PixelFormat::Bgr, vec![0; 48]).unwrap();
    // Fill the right half with red; BGR order puts 0xFF last.
    let boxed = draw_box(&black, 0.5, 0.0, 0.5, 1.0, [255, 0, 0], 1, true).unwrap();

    assert_eq!(pixel(&boxed, 0, 0), &[0, 0, 0]);
    assert_eq!(pixel(&boxed, 0, 2), &[0, 0, 255]);
    assert_eq!(pixel(&boxed, 3, 3), &[0, 0, 255]);
}

#[test]
fn test_draw_box_outline_leaves_interior() {
    let black = Image::from_pixels(8, 8, PixelFormat::Bgr, vec![0; 192]).unwrap();
    let boxed = draw_box(&black, 0.0, 0.0, 1.0, 1.0, [0, 255, 0], 1, false).unwrap();

    // Edge painted, center untouched.
    assert_eq!(pixel(&boxed, 0, 0), &[0, 255, 0]);
    assert_eq!(pixel(&boxed, 4, 4), &[0, 0, 0]);
}

#[test]
fn test_draw_box_rejects_out_of_range() {
    let image = card();
    assert!(draw_box(&image, 1.5, 0.0, 0.1, 0.1, [0, 0, 0], 1, true).is_err());
    assert!(draw_box(&image, 0.0, 0.0, -0.1, 0.1, [0, 0, 0], 1, true).is_err());
}

// =============================================================================
// Predicates
// =============================================================================

#[test]
fn test_predicate_gates_by_topic() {
    let predicate = TopicPredicate::only(["main"]);

    let mut on_main = Frame::new(Some(card()), DataMap::new());
    on_main.set_topic("main");
    let ran = predicate.apply(&mut on_main, |img| Ok(flip_x(img))).unwrap();
    assert!(ran);

    let mut on_preview = Frame::new(Some(card()), DataMap::new());
    on_preview.set_topic("preview");
    let ran = predicate
        .apply(&mut on_preview, |img| Ok(flip_x(img)))
        .unwrap();
    assert!(!ran);
    assert_eq!(on_preview.image().unwrap().pixels(), card().pixels());
}

#[test]
fn test_predicate_skips_imageless_frames() {
    let predicate = TopicPredicate::all();
    let mut frame = Frame::from_data(DataMap::new());
    let ran = predicate.apply(&mut frame, |img| Ok(flip_x(img))).unwrap();
    assert!(!ran);
}
