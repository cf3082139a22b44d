//! CPU side of imgfx: the RGBA8 raster every filter reads and writes.
//!
//! ```text
//!   image file ──▶ provider::load ──▶ PixelBuffer ──▶ convolve(kernel) ──▶ PixelBuffer
//!                                          │
//!                                          ├─▶ recolor::{to_grayscale, to_black_and_white}
//!                                          └─▶ histogram::color_frequencies
//! ```
//!
//! The GPU pipeline in `shaderfx` consumes the same [`PixelBuffer`] as its input
//! texture and composites its output back into it, so the byte layout here is
//! the contract shared by every stage: tightly packed rows, four channels in
//! R, G, B, A order, no padding.

mod buffer;
pub mod color;
mod convolve;
mod error;
pub mod histogram;
mod kernel;
pub mod provider;
pub mod recolor;

pub use buffer::{PixelBuffer, BYTES_PER_PIXEL};
pub use convolve::convolve;
pub use error::RasterError;
pub use kernel::{Kernel, KernelPreset};
