//! Packing of RGBA bytes into a single `u32` (`0xRRGGBBAA`).

pub fn rgba_to_color(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (u32::from(r) << 24) | (u32::from(g) << 16) | (u32::from(b) << 8) | u32::from(a)
}

pub fn color_to_rgba(color: u32) -> [u8; 4] {
    color.to_be_bytes()
}

/// Relative luminance of an RGBA pixel, normalized to `[0, 1]`.
pub fn luminance(px: &[u8]) -> f64 {
    0.2126 * (f64::from(px[0]) / 255.0)
        + 0.7152 * (f64::from(px[1]) / 255.0)
        + 0.0722 * (f64::from(px[2]) / 255.0)
}
