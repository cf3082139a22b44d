//! wgpu plumbing behind the filter pipeline.
//!
//! - `context` picks an adapter without a surface and owns device and queue.
//! - `model` holds the unit quad and its transform matrices.
//! - `program` wraps and compiles fragment shaders and stages their uniforms.
//! - `target` is the offscreen attachment and its padded readback buffer.
//! - `session` ties one source image to one program for repeated draws.
//! - `pipeline` is the public entry point that composites results back.

mod context;
mod model;
mod pipeline;
mod program;
mod session;
mod target;

pub use context::GpuContext;
pub use pipeline::GpuFilterPipeline;
pub(crate) use session::FilterSession;
