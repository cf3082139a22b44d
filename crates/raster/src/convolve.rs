use crate::buffer::{PixelBuffer, BYTES_PER_PIXEL};
use crate::kernel::Kernel;

/// Convolves `src` with `kernel`, producing a new buffer of the same size.
///
/// Each destination pixel is the weighted sum of normalized source samples
/// around it. Taps that land outside the image are skipped, so edge pixels see
/// a truncated kernel that is not re-normalized. Alpha is never convolved: it
/// is copied from the source pixel under the center tap. Color sums are
/// scaled back to bytes by truncation and saturate at 0 and 255.
pub fn convolve(src: &PixelBuffer, kernel: &Kernel) -> PixelBuffer {
    let mut out = src.clone();
    let stride = src.stride();
    if stride == 0 {
        return out;
    }

    tracing::trace!(
        width = src.width(),
        height = src.height(),
        kernel_width = kernel.width(),
        "convolving buffer"
    );

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        out.as_bytes_mut()
            .par_chunks_exact_mut(stride)
            .enumerate()
            .for_each(|(y, row)| convolve_row(src, kernel, y as u32, row));
    }

    #[cfg(not(feature = "parallel"))]
    {
        for (y, row) in out.as_bytes_mut().chunks_exact_mut(stride).enumerate() {
            convolve_row(src, kernel, y as u32, row);
        }
    }

    out
}

fn convolve_row(src: &PixelBuffer, kernel: &Kernel, y: u32, row: &mut [u8]) {
    let width = src.width() as i64;
    let height = src.height() as i64;
    let kernel_width = kernel.width() as usize;
    let radius = kernel.radius() as i64;
    let weights = kernel.weights();
    let data = src.as_bytes();
    let y = y as i64;

    for (x, dst) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
        let x = x as i64;
        let mut acc = [0.0f64; 3];
        let mut alpha = 0u8;

        for (ky, kernel_row) in weights.chunks_exact(kernel_width).enumerate() {
            let sy = y + ky as i64 - radius;
            if sy < 0 || sy >= height {
                continue;
            }
            let row_offset = sy as usize * width as usize;
            for (kx, &weight) in kernel_row.iter().enumerate() {
                let sx = x + kx as i64 - radius;
                if sx < 0 || sx >= width {
                    continue;
                }
                let offset = (row_offset + sx as usize) * BYTES_PER_PIXEL;
                let sample = &data[offset..offset + BYTES_PER_PIXEL];
                for channel in 0..3 {
                    acc[channel] += weight * (f64::from(sample[channel]) / 255.0);
                }
                if sx == x && sy == y {
                    alpha = sample[3];
                }
            }
        }

        for channel in 0..3 {
            dst[channel] = to_byte(acc[channel]);
        }
        dst[3] = alpha;
    }
}

fn to_byte(value: f64) -> u8 {
    // NaN falls through `as` to 0.
    (value * 255.0).trunc().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelPreset;

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[
                    (x * 37 % 256) as u8,
                    (y * 53 % 256) as u8,
                    ((x + y) * 11 % 256) as u8,
                    (x * 7 + y * 13) as u8,
                ]);
            }
        }
        PixelBuffer::new(width, height, data).unwrap()
    }

    #[test]
    fn identity_kernel_is_a_no_op() {
        let src = gradient(7, 5);
        let out = convolve(&src, &Kernel::identity());
        assert_eq!(out, src);

        let centered = convolve(&src, &KernelPreset::Identity.kernel());
        assert_eq!(centered, src);
    }

    #[test]
    fn box_blur_preserves_uniform_color() {
        let src = PixelBuffer::filled(5, 5, [13, 128, 254, 200]).unwrap();
        let out = convolve(&src, &KernelPreset::BoxBlur.kernel());
        // Only the interior sees the full kernel.
        for y in 1..4 {
            for x in 1..4 {
                let px = out.pixel(x, y).unwrap();
                for channel in 0..3 {
                    let diff = i32::from(px[channel]) - i32::from(src.as_bytes()[channel]);
                    assert!(diff.abs() <= 1, "channel {channel} drifted by {diff}");
                }
                assert_eq!(px[3], 200);
            }
        }
    }

    #[test]
    fn out_of_bounds_taps_are_skipped() {
        let src = PixelBuffer::filled(1, 1, [90, 45, 180, 77]).unwrap();
        let kernel = Kernel::new(vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0], 3).unwrap();
        let out = convolve(&src, &kernel);
        assert_eq!(out.pixel(0, 0), Some([90, 45, 180, 77]));
    }

    #[test]
    fn edges_are_not_renormalized() {
        let src = PixelBuffer::filled(3, 3, [90, 90, 90, 255]).unwrap();
        let out = convolve(&src, &KernelPreset::BoxBlur.kernel());
        // The corner only sees four of nine taps.
        let corner = out.pixel(0, 0).unwrap();
        assert_eq!(corner[0], 40);
        let center = out.pixel(1, 1).unwrap();
        assert!((i32::from(center[0]) - 90).abs() <= 1);
    }

    #[test]
    fn alpha_comes_from_center_tap() {
        let src = gradient(6, 6);
        let out = convolve(&src, &KernelPreset::BoxBlur.kernel());
        for (before, after) in src.pixels().zip(out.pixels()) {
            assert_eq!(before[3], after[3]);
        }
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        let src = PixelBuffer::filled(3, 3, [200, 10, 0, 255]).unwrap();
        let doubled = Kernel::new(vec![2.0], 1).unwrap();
        let out = convolve(&src, &doubled);
        assert_eq!(out.pixel(1, 1), Some([255, 20, 0, 255]));

        let negated = Kernel::new(vec![-1.0], 1).unwrap();
        let out = convolve(&src, &negated);
        assert_eq!(out.pixel(1, 1), Some([0, 0, 0, 255]));
    }

    #[test]
    fn sharpen_keeps_uniform_red() {
        let src = PixelBuffer::filled(2, 2, [255, 0, 0, 255]).unwrap();
        let out = convolve(&src, &KernelPreset::Sharpen.kernel());
        assert_eq!(out.dimensions(), (2, 2));
        for px in out.pixels() {
            assert_eq!(px, &[255, 0, 0, 255]);
        }
    }

    #[test]
    fn empty_buffer_round_trips() {
        let src = PixelBuffer::transparent(0, 4).unwrap();
        let out = convolve(&src, &KernelPreset::Sharpen.kernel());
        assert_eq!(out.dimensions(), (0, 4));
    }
}
