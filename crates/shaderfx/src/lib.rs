//! GPU half of imgfx: fragment-shader filters over a [`raster::PixelBuffer`].
//!
//! ```text
//!   PixelBuffer ──upload──▶ texture ─┐
//!   fragment GLSL ──wrap──▶ program ─┼─▶ draw quad ──▶ readback ──▶ composite over PixelBuffer
//!   [ShaderUniform] ──stage──────────┘
//! ```
//!
//! A [`GpuContext`] is acquired explicitly and can be shared by any number of
//! [`GpuFilterPipeline`]s and animations. Nothing is cached between calls: each
//! [`GpuFilterPipeline::apply_shader`] compiles its own program and uploads
//! its own texture. [`AnimationScheduler`] keeps one of those setups alive and
//! redraws it with fresh uniforms every frame until its handle is stopped.
//!
//! Caller shaders are WebGL-flavoured GLSL: loose `uniform` declarations,
//! `varying` texture coordinates, `texture2D`, and `gl_FragColor` all work.
//! By default a shader that fails to compile is logged and skipped, leaving
//! the destination untouched; [`ShaderValidation::Strict`] turns that into
//! [`FilterError::ShaderCompile`].

mod animation;
mod compile;
mod error;
mod gpu;
mod timing;
mod types;
mod uniforms;

pub use animation::{Animation, AnimationHandle, AnimationOptions, AnimationScheduler, UniformsForTime};
pub use compile::IDENTITY_FRAGMENT;
pub use error::FilterError;
pub use gpu::{GpuContext, GpuFilterPipeline};
pub use timing::{NoopPhaseTimer, Phase, PhaseTimer, PhaseTimings, TracingPhaseTimer};
pub use types::{
    AdapterProfile, BackendPreference, GpuPowerPreference, PipelineOptions, ShaderValidation,
};
pub use uniforms::{resolve_all, ShaderUniform, UniformDescriptor, UniformKind};

pub use scheduler::{CancellationToken, FrameControl, TimeSample};
