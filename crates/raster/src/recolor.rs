//! Single-pass recolor filters that rewrite a buffer in place.

use crate::buffer::PixelBuffer;
use crate::color::luminance;

/// Replaces R, G and B with the truncated luminance; alpha is left alone.
pub fn to_grayscale(buffer: &mut PixelBuffer) {
    for px in buffer.pixels_mut() {
        let gray = (luminance(px) * 255.0) as u8;
        px[0] = gray;
        px[1] = gray;
        px[2] = gray;
    }
}

/// Thresholds luminance at one half: darker pixels become opaque black, the
/// rest opaque white.
pub fn to_black_and_white(buffer: &mut PixelBuffer) {
    for px in buffer.pixels_mut() {
        let value = if luminance(px) < 0.5 { 0 } else { 255 };
        px.copy_from_slice(&[value, value, value, 255]);
    }
}
