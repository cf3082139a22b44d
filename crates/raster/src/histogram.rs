use std::collections::HashMap;

use crate::buffer::PixelBuffer;
use crate::color::rgba_to_color;

/// Counts how many pixels carry each exact RGBA value, keyed by the packed
/// `0xRRGGBBAA` color.
pub fn color_frequencies(buffer: &PixelBuffer) -> HashMap<u32, usize> {
    let mut frequencies = HashMap::new();
    for px in buffer.pixels() {
        *frequencies
            .entry(rgba_to_color(px[0], px[1], px[2], px[3]))
            .or_insert(0) += 1;
    }
    frequencies
}

/// Frequencies sorted by descending count, ties broken by color value.
pub fn most_frequent(buffer: &PixelBuffer, limit: usize) -> Vec<(u32, usize)> {
    let mut entries: Vec<_> = color_frequencies(buffer).into_iter().collect();
    entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    entries.truncate(limit);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_exact_colors() {
        let buffer = PixelBuffer::new(
            3,
            1,
            vec![255, 0, 0, 255, 255, 0, 0, 255, 255, 0, 0, 254],
        )
        .unwrap();
        let frequencies = color_frequencies(&buffer);
        assert_eq!(frequencies.len(), 2);
        assert_eq!(frequencies[&0xFF00_00FF], 2);
        assert_eq!(frequencies[&0xFF00_00FE], 1);
    }

    #[test]
    fn most_frequent_orders_by_count() {
        let mut buffer = PixelBuffer::filled(2, 2, [1, 2, 3, 4]).unwrap();
        buffer.set_pixel(0, 0, [9, 9, 9, 9]);
        let top = most_frequent(&buffer, 1);
        assert_eq!(top, vec![(0x0102_0304, 3)]);
    }
}
