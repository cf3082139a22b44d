//! Re-running a filter every frame with time-dependent uniforms.
//!
//! Setup (context, quad, program, texture upload, scene-size uniforms) happens
//! once. Each frame only stages the uniforms produced for its timestamp and
//! redraws, so nothing is uploaded per frame except the parameter block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use raster::PixelBuffer;
use scheduler::{
    run_frames, CancellationToken, FrameControl, FramePacing, SystemTimeSource, TimeSample,
    TimeSource,
};

use crate::error::FilterError;
use crate::gpu::{FilterSession, GpuContext};
use crate::timing::{NoopPhaseTimer, PhaseTimer, TracingPhaseTimer};
use crate::types::ShaderValidation;
use crate::uniforms::ShaderUniform;

/// Computes the uniforms for a frame from its timestamp.
pub type UniformsForTime = Box<dyn FnMut(TimeSample) -> Vec<ShaderUniform> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnimationOptions {
    /// Frame cap; `None` or a non-positive value renders as fast as possible.
    pub target_fps: Option<f32>,
    pub validation: ShaderValidation,
}

impl AnimationOptions {
    pub fn pacing(&self) -> Result<FramePacing, FilterError> {
        match self.target_fps {
            None => Ok(FramePacing::Uncapped),
            Some(fps) => Ok(FramePacing::from_fps(Some(fps))?),
        }
    }
}

/// A prepared animated filter driven by whoever owns the clock.
pub struct Animation {
    session: FilterSession,
    source: PixelBuffer,
    uniforms_for_time: UniformsForTime,
    timer: Box<dyn PhaseTimer + Send>,
}

impl Animation {
    pub fn prepare(
        context: &GpuContext,
        source: &PixelBuffer,
        fragment: &str,
        validation: ShaderValidation,
        uniforms_for_time: impl FnMut(TimeSample) -> Vec<ShaderUniform> + Send + 'static,
    ) -> Result<Self, FilterError> {
        let mut timer = TracingPhaseTimer;
        let session = FilterSession::prepare(context, source, fragment, validation, &mut timer)?;
        Ok(Self {
            session,
            source: source.clone(),
            uniforms_for_time: Box::new(uniforms_for_time),
            // Per-frame phases are too chatty for the default sink.
            timer: Box::new(NoopPhaseTimer),
        })
    }

    pub fn with_timer(mut self, timer: impl PhaseTimer + Send + 'static) -> Self {
        self.timer = Box::new(timer);
        self
    }

    /// Renders the frame for `sample` composited over the original source.
    pub fn render_frame(&mut self, sample: TimeSample) -> Result<PixelBuffer, FilterError> {
        let uniforms = (self.uniforms_for_time)(sample);
        self.session.stage(&uniforms)?;

        let mut output = self.source.clone();
        if self.session.is_linked() {
            let frame = self.session.render(self.timer.as_mut())?;
            output.composite_over(&frame)?;
        }
        Ok(output)
    }

    /// Drives frames on the current thread until `on_frame` stops, a frame
    /// fails, or `token` is cancelled. Returns the number of frames rendered.
    pub fn run<T, F>(
        &mut self,
        token: &CancellationToken,
        pacing: FramePacing,
        time_source: &mut T,
        mut on_frame: F,
    ) -> Result<u64, FilterError>
    where
        T: TimeSource + ?Sized,
        F: FnMut(TimeSample, &PixelBuffer) -> FrameControl,
    {
        run_frames(token, pacing, time_source, |sample| {
            let frame = self.render_frame(sample)?;
            Ok(on_frame(sample, &frame))
        })
    }
}

/// Starts animations on a dedicated worker thread.
pub struct AnimationScheduler;

impl AnimationScheduler {
    /// Prepares the animation synchronously, so setup errors surface here,
    /// then hands it to a worker that renders against the system clock.
    pub fn start<U, F>(
        context: &GpuContext,
        source: &PixelBuffer,
        fragment: &str,
        uniforms_for_time: U,
        options: AnimationOptions,
        mut on_frame: F,
    ) -> Result<AnimationHandle, FilterError>
    where
        U: FnMut(TimeSample) -> Vec<ShaderUniform> + Send + 'static,
        F: FnMut(TimeSample, &PixelBuffer) -> FrameControl + Send + 'static,
    {
        let pacing = options.pacing()?;
        let mut animation = Animation::prepare(
            context,
            source,
            fragment,
            options.validation,
            uniforms_for_time,
        )?;

        let token = CancellationToken::new();
        let counter = Arc::new(AtomicU64::new(0));
        let worker_token = token.clone();
        let worker_counter = Arc::clone(&counter);

        let worker = thread::Builder::new()
            .name("imgfx-animation".to_string())
            .spawn(move || {
                let mut clock = SystemTimeSource::new();
                let result = animation.run(&worker_token, pacing, &mut clock, |sample, frame| {
                    worker_counter.fetch_add(1, Ordering::Relaxed);
                    on_frame(sample, frame)
                });
                // Let `is_running` report false once the loop ends on its own.
                worker_token.cancel();
                if let Err(err) = &result {
                    tracing::warn!(error = %err, "animation stopped on error");
                }
                result
            })
            .map_err(|err| FilterError::invalid(format!("failed to spawn animation worker: {err}")))?;

        tracing::debug!(?pacing, "animation started");
        Ok(AnimationHandle {
            token,
            worker: Some(worker),
            frames: counter,
        })
    }
}

/// Running animation. Dropping the handle stops it and waits for the worker.
pub struct AnimationHandle {
    token: CancellationToken,
    worker: Option<JoinHandle<Result<u64, FilterError>>>,
    frames: Arc<AtomicU64>,
}

impl AnimationHandle {
    /// Requests a stop; the frame in flight, if any, still completes.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Waits for the worker and returns how many frames it rendered.
    pub fn join(mut self) -> Result<u64, FilterError> {
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| FilterError::WorkerPanicked)?,
            None => Ok(self.frames_rendered()),
        }
    }
}

impl Drop for AnimationHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
