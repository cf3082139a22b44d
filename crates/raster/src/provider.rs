//! Getting pixels in and out of files, and sizing them to a canvas.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::buffer::PixelBuffer;
use crate::error::RasterError;

/// Decodes an image file into an RGBA8 buffer.
pub fn load(path: &Path) -> Result<PixelBuffer, RasterError> {
    let decoded = image::open(path).map_err(|source| RasterError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let rgba = decoded.into_rgba8();
    tracing::debug!(
        path = %path.display(),
        width = rgba.width(),
        height = rgba.height(),
        "decoded source image"
    );
    Ok(PixelBuffer::from(rgba))
}

/// Writes a buffer to disk; the format follows the file extension.
pub fn save(buffer: &PixelBuffer, path: &Path) -> Result<(), RasterError> {
    let image: RgbaImage = buffer.clone().into();
    image.save(path).map_err(|source| RasterError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

/// Canvas size for drawing a `source`-sized image into a `requested` box.
///
/// With `proportional`, the shorter side of the request is shrunk so the
/// source aspect ratio survives: landscape sources scale the height, portrait
/// sources scale the width, square sources keep the request as-is.
pub fn canvas_size(
    source: (u32, u32),
    requested: (u32, u32),
    proportional: bool,
) -> Result<(u32, u32), RasterError> {
    let (src_w, src_h) = source;
    let (mut width, mut height) = (f64::from(requested.0), f64::from(requested.1));
    if proportional {
        if src_w > src_h {
            height *= f64::from(src_h) / f64::from(src_w);
        } else if src_h > src_w {
            width *= f64::from(src_w) / f64::from(src_h);
        }
    }

    let (width, height) = (width as u32, height as u32);
    if width == 0 || height == 0 {
        return Err(RasterError::invalid(format!(
            "canvas for {src_w}x{src_h} source collapses to {width}x{height}"
        )));
    }
    Ok((width, height))
}

/// Redraws `buffer` onto a freshly sized canvas.
pub fn resize_to_canvas(
    buffer: &PixelBuffer,
    width: u32,
    height: u32,
    proportional: bool,
) -> Result<PixelBuffer, RasterError> {
    let (width, height) = canvas_size(buffer.dimensions(), (width, height), proportional)?;
    if (width, height) == buffer.dimensions() {
        return Ok(buffer.clone());
    }
    let image: RgbaImage = buffer.clone().into();
    let resized = imageops::resize(&image, width, height, FilterType::Triangle);
    Ok(PixelBuffer::from(resized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn proportional_landscape_shrinks_height() {
        assert_eq!(canvas_size((400, 200), (100, 100), true).unwrap(), (100, 50));
    }

    #[test]
    fn proportional_portrait_shrinks_width() {
        assert_eq!(canvas_size((200, 400), (100, 100), true).unwrap(), (50, 100));
    }

    #[test]
    fn square_and_non_proportional_keep_request() {
        assert_eq!(canvas_size((300, 300), (64, 32), true).unwrap(), (64, 32));
        assert_eq!(canvas_size((400, 200), (64, 64), false).unwrap(), (64, 64));
    }

    #[test]
    fn degenerate_canvas_is_rejected() {
        assert!(canvas_size((1000, 1), (10, 10), true).is_err());
    }

    #[test]
    fn resize_produces_requested_dimensions() {
        let buffer = PixelBuffer::filled(8, 4, [10, 20, 30, 255]).unwrap();
        let resized = resize_to_canvas(&buffer, 4, 4, true).unwrap();
        assert_eq!(resized.dimensions(), (4, 2));
        assert_eq!(resized.pixel(1, 1), Some([10, 20, 30, 255]));
    }

    #[test]
    fn save_and_load_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.png");
        let buffer = PixelBuffer::filled(3, 2, [1, 2, 3, 4]).unwrap();
        save(&buffer, &path).unwrap();
        assert_eq!(load(&path).unwrap(), buffer);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("missing.png")).unwrap_err();
        assert!(matches!(err, RasterError::Decode { .. }));
    }
}
