use raster::PixelBuffer;

use crate::error::FilterError;
use crate::timing::{PhaseTimer, TracingPhaseTimer};
use crate::types::PipelineOptions;
use crate::uniforms::{resolve_all, ShaderUniform, UniformDescriptor};

use super::context::GpuContext;
use super::session::FilterSession;

/// Applies fragment shaders to pixel buffers on the GPU.
pub struct GpuFilterPipeline {
    context: GpuContext,
    options: PipelineOptions,
    timer: Box<dyn PhaseTimer + Send>,
}

impl GpuFilterPipeline {
    pub fn new(context: GpuContext, options: PipelineOptions) -> Self {
        Self {
            context,
            options,
            timer: Box::new(TracingPhaseTimer),
        }
    }

    /// Acquires a fresh context with `options` and wraps it.
    pub fn acquire(options: PipelineOptions) -> Result<Self, FilterError> {
        let context = GpuContext::acquire(&options)?;
        Ok(Self::new(context, options))
    }

    pub fn with_timer(mut self, timer: impl PhaseTimer + Send + 'static) -> Self {
        self.timer = Box::new(timer);
        self
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs `fragment` over `target` and composites the result back onto it.
    ///
    /// Each invocation compiles its own program, uploads `target` as the
    /// source texture, and renders into a transparent offscreen frame that is
    /// then drawn over the original pixels. An empty buffer is returned
    /// untouched without touching the GPU.
    pub fn apply_shader(
        &mut self,
        target: &mut PixelBuffer,
        fragment: &str,
        uniforms: &[ShaderUniform],
    ) -> Result<(), FilterError> {
        if target.pixel_count() == 0 {
            return Ok(());
        }

        let mut session = FilterSession::prepare(
            &self.context,
            target,
            fragment,
            self.options.validation,
            self.timer.as_mut(),
        )?;
        session.stage(uniforms)?;
        if !session.is_linked() {
            return Ok(());
        }

        let frame = session.render(self.timer.as_mut())?;
        target.composite_over(&frame)?;
        Ok(())
    }

    /// Like [`apply_shader`](Self::apply_shader), but with untyped uniform
    /// descriptors. Every descriptor is validated before any GPU work.
    pub fn apply_shader_descriptors(
        &mut self,
        target: &mut PixelBuffer,
        fragment: &str,
        descriptors: &[UniformDescriptor],
    ) -> Result<(), FilterError> {
        let uniforms = resolve_all(descriptors)?;
        self.apply_shader(target, fragment, &uniforms)
    }

    /// Owned-output convenience over [`apply_shader`](Self::apply_shader).
    pub fn filter(
        &mut self,
        source: &PixelBuffer,
        fragment: &str,
        uniforms: &[ShaderUniform],
    ) -> Result<PixelBuffer, FilterError> {
        let mut output = source.clone();
        self.apply_shader(&mut output, fragment, uniforms)?;
        Ok(output)
    }
}
