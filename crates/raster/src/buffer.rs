use image::RgbaImage;

use crate::error::RasterError;

/// R, G, B, A.
pub const BYTES_PER_PIXEL: usize = 4;

/// Flat RGBA8 raster with explicit dimensions.
///
/// `data.len() == width * height * 4` holds for every constructed value; the
/// constructors are the only way in, so stages can index without re-checking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wraps an existing byte vector, rejecting it if the length does not match
    /// the dimensions.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, RasterError> {
        let expected = expected_len(width, height)?;
        if data.len() != expected {
            return Err(RasterError::invalid(format!(
                "pixel data has {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Creates a buffer where every pixel holds `rgba`.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, RasterError> {
        let pixels = expected_len(width, height)? / BYTES_PER_PIXEL;
        Ok(Self {
            width,
            height,
            data: rgba.repeat(pixels),
        })
    }

    /// Transparent black buffer of the given size.
    pub fn transparent(width: u32, height: u32) -> Result<Self, RasterError> {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len() / BYTES_PER_PIXEL
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Bytes of row `y`, or `None` past the last row.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.stride();
        let start = y as usize * stride;
        Some(&self.data[start..start + stride])
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let offset = self.offset(x, y)?;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[offset..offset + BYTES_PER_PIXEL]);
        Some(px)
    }

    /// Overwrites one pixel. Returns `false` when the coordinates are out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) -> bool {
        match self.offset(x, y) {
            Some(offset) => {
                self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&rgba);
                true
            }
            None => false,
        }
    }

    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(BYTES_PER_PIXEL)
    }

    pub fn pixels_mut(&mut self) -> impl Iterator<Item = &mut [u8]> {
        self.data.chunks_exact_mut(BYTES_PER_PIXEL)
    }

    pub(crate) fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL)
    }

    /// Source-over composite of `top` onto `self` using straight (non-premultiplied)
    /// alpha. An opaque `top` replaces the destination outright; a fully
    /// transparent `top` leaves it untouched.
    pub fn composite_over(&mut self, top: &PixelBuffer) -> Result<(), RasterError> {
        if top.dimensions() != self.dimensions() {
            return Err(RasterError::invalid(format!(
                "cannot composite {}x{} onto {}x{}",
                top.width, top.height, self.width, self.height
            )));
        }

        for (dst, src) in self.pixels_mut().zip(top.pixels()) {
            let src_a = f32::from(src[3]) / 255.0;
            if src[3] == 255 {
                dst.copy_from_slice(src);
                continue;
            }
            if src[3] == 0 {
                continue;
            }
            let dst_a = f32::from(dst[3]) / 255.0;
            let out_a = src_a + dst_a * (1.0 - src_a);
            for channel in 0..3 {
                let blended = (f32::from(src[channel]) * src_a
                    + f32::from(dst[channel]) * dst_a * (1.0 - src_a))
                    / out_a;
                dst[channel] = blended.round().clamp(0.0, 255.0) as u8;
            }
            dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        Ok(())
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

impl From<PixelBuffer> for RgbaImage {
    fn from(buffer: PixelBuffer) -> Self {
        // Length invariant guarantees the container fits.
        RgbaImage::from_raw(buffer.width, buffer.height, buffer.data)
            .unwrap_or_else(|| RgbaImage::new(0, 0))
    }
}

fn expected_len(width: u32, height: u32) -> Result<usize, RasterError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(|| RasterError::invalid(format!("{width}x{height} buffer size overflows")))
}
