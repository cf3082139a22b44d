use std::sync::mpsc;

use raster::{PixelBuffer, BYTES_PER_PIXEL};

use crate::error::FilterError;

pub(crate) const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Offscreen colour attachment plus the staging buffer it is copied into.
pub(crate) struct RenderTarget {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    readback: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("filter target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let padded_bytes_per_row = align_to(
            width * BYTES_PER_PIXEL as u32,
            wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
        );
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("filter readback"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            readback,
            width,
            height,
            padded_bytes_per_row,
        }
    }

    pub fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Maps the staging buffer and strips row padding. Blocks until the copy
    /// submitted before this call has landed.
    pub fn read_back(&self, device: &wgpu::Device) -> Result<PixelBuffer, FilterError> {
        let slice = self.readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| FilterError::Readback(format!("device poll failed: {err}")))?;
        rx.recv()
            .map_err(|_| FilterError::Readback("map callback dropped".to_string()))?
            .map_err(|err| FilterError::Readback(format!("buffer map failed: {err}")))?;

        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        let padded = self.padded_bytes_per_row as usize;
        let mut pixels = Vec::with_capacity(row_bytes * self.height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in 0..self.height as usize {
                let start = row * padded;
                pixels.extend_from_slice(&mapped[start..start + row_bytes]);
            }
        }
        self.readback.unmap();

        Ok(PixelBuffer::new(self.width, self.height, pixels)?)
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
mod tests {
    use super::align_to;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(align_to(4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 256);
        assert_eq!(align_to(256, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 256);
        assert_eq!(align_to(1028, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 1280);
    }
}
