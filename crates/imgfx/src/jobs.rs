//! Filter operations shared by the subcommands and the job-file runner.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use filterconfig::{Defaults, Job, JobKind};
use raster::{provider, recolor, Kernel, PixelBuffer};
use scheduler::{FixedStepTimeSource, FramePacing};
use serde::Serialize;
use shaderfx::{
    Animation, CancellationToken, FrameControl, GpuContext, GpuFilterPipeline, PipelineOptions,
    ShaderValidation, UniformDescriptor,
};

use crate::bindings::{descriptor_from_spec, kernel_from_job, FrameUniforms};

/// GPU context acquired on first use and shared by every later job.
pub struct Gpu {
    options: PipelineOptions,
    context: Option<GpuContext>,
}

impl Gpu {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            context: None,
        }
    }

    fn context(&mut self) -> Result<GpuContext> {
        if let Some(context) = &self.context {
            return Ok(context.clone());
        }
        let context =
            GpuContext::acquire(&self.options).context("failed to acquire a GPU context")?;
        tracing::info!(adapter = %context.profile(), "using GPU adapter");
        self.context = Some(context.clone());
        Ok(context)
    }

    fn options_for(&self, strict: bool) -> PipelineOptions {
        let mut options = self.options;
        options.validation = validation(strict);
        options
    }
}

fn validation(strict: bool) -> ShaderValidation {
    if strict {
        ShaderValidation::Strict
    } else {
        ShaderValidation::Permissive
    }
}

pub fn load_source(input: &Path, scale: Option<(u32, u32)>, proportional: bool) -> Result<PixelBuffer> {
    let buffer = provider::load(input)
        .with_context(|| format!("failed to load image {}", input.display()))?;
    match scale {
        Some((width, height)) => {
            let resized = provider::resize_to_canvas(&buffer, width, height, proportional)
                .with_context(|| format!("failed to scale {}", input.display()))?;
            tracing::debug!(
                from = ?buffer.dimensions(),
                to = ?resized.dimensions(),
                proportional,
                "scaled source"
            );
            Ok(resized)
        }
        None => Ok(buffer),
    }
}

pub fn write_image(buffer: &PixelBuffer, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    provider::save(buffer, output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(path = %output.display(), "wrote image");
    Ok(())
}

pub fn convolve(source: &PixelBuffer, kernel: &Kernel) -> PixelBuffer {
    tracing::debug!(width = kernel.width(), sum = kernel.sum(), "convolving");
    raster::convolve(source, kernel)
}

pub fn grayscale(mut source: PixelBuffer) -> PixelBuffer {
    recolor::to_grayscale(&mut source);
    source
}

pub fn threshold(mut source: PixelBuffer) -> PixelBuffer {
    recolor::to_black_and_white(&mut source);
    source
}

fn read_fragment(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read shader at {}", path.display()))
}

pub fn shader(
    gpu: &mut Gpu,
    mut target: PixelBuffer,
    fragment: &Path,
    uniforms: &[UniformDescriptor],
    strict: bool,
) -> Result<PixelBuffer> {
    let source = read_fragment(fragment)?;
    let context = gpu.context()?;
    let mut pipeline = GpuFilterPipeline::new(context, gpu.options_for(strict));
    pipeline
        .apply_shader_descriptors(&mut target, &source, uniforms)
        .with_context(|| format!("shader {} failed", fragment.display()))?;
    Ok(target)
}

/// Offline animation parameters.
#[derive(Debug, Clone, Copy)]
pub struct Clip {
    pub duration: Duration,
    pub fps: f32,
}

impl Clip {
    pub fn frame_count(&self) -> u64 {
        // Absorb float error so e.g. 100ms at 30fps stays at three frames.
        let exact = self.duration.as_secs_f64() * f64::from(self.fps);
        ((exact - 1e-9).ceil() as u64).max(1)
    }
}

/// Renders `clip` against a fixed-step clock and writes `frame_NNNNN.png`
/// files into `out_dir`. Returns the number of frames written.
pub fn animate(
    gpu: &mut Gpu,
    source: &PixelBuffer,
    fragment: &Path,
    uniforms: FrameUniforms,
    clip: Clip,
    strict: bool,
    out_dir: &Path,
) -> Result<u64> {
    if !clip.fps.is_finite() || clip.fps <= 0.0 {
        bail!("offline animation needs a positive fps, got {}", clip.fps);
    }
    let fragment_source = read_fragment(fragment)?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let context = gpu.context()?;
    let mut animation = Animation::prepare(
        &context,
        source,
        &fragment_source,
        validation(strict),
        move |sample| uniforms.at(sample),
    )
    .with_context(|| format!("failed to prepare animation {}", fragment.display()))?;

    let total = clip.frame_count();
    let token = CancellationToken::new();
    let mut clock = FixedStepTimeSource::from_fps(clip.fps);
    let mut write_error = None;
    let frames = animation.run(&token, FramePacing::Uncapped, &mut clock, |sample, frame| {
        let path = out_dir.join(format!("frame_{:05}.png", sample.frame_index));
        if let Err(err) = provider::save(frame, &path) {
            write_error = Some(err);
            return FrameControl::Stop;
        }
        if sample.frame_index + 1 >= total {
            FrameControl::Stop
        } else {
            FrameControl::Continue
        }
    })?;
    if let Some(err) = write_error {
        return Err(err).context("failed to write animation frame");
    }

    tracing::info!(frames, dir = %out_dir.display(), "wrote animation frames");
    Ok(frames)
}

#[derive(Debug, Serialize)]
pub struct ColorCount {
    pub color: String,
    pub rgba: [u8; 4],
    pub count: usize,
}

pub fn histogram(source: &PixelBuffer, top: usize) -> Vec<ColorCount> {
    raster::histogram::most_frequent(source, top)
        .into_iter()
        .map(|(color, count)| ColorCount {
            color: format!("#{color:08x}"),
            rgba: raster::color::color_to_rgba(color),
            count,
        })
        .collect()
}

pub fn run_job(job: &Job, defaults: &Defaults, gpu: &mut Gpu) -> Result<()> {
    let source = load_source(&job.input, job.canvas()?, job.proportional)?;
    let strict = job.resolved_strict(defaults);

    let fragment = || {
        job.fragment
            .as_deref()
            .context("shader jobs need a fragment path")
    };

    match job.kind {
        JobKind::Convolve => {
            let kernel = kernel_from_job(job)?;
            write_image(&convolve(&source, &kernel), &job.output)
        }
        JobKind::Grayscale => write_image(&grayscale(source), &job.output),
        JobKind::Threshold => write_image(&threshold(source), &job.output),
        JobKind::Shader => {
            let descriptors: Vec<_> = job.uniforms.iter().map(descriptor_from_spec).collect();
            let output = shader(gpu, source, fragment()?, &descriptors, strict)?;
            write_image(&output, &job.output)
        }
        JobKind::Animate => {
            let uniforms = FrameUniforms::from_specs(&job.uniforms)?;
            let clip = Clip {
                duration: job.duration.unwrap_or(Duration::from_secs(1)),
                fps: job
                    .resolved_fps(defaults)
                    .filter(|fps| *fps > 0.0)
                    .unwrap_or(30.0),
            };
            animate(gpu, &source, fragment()?, uniforms, clip, strict, &job.output).map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn clip_rounds_frames_up() {
        let clip = Clip {
            duration: Duration::from_millis(1010),
            fps: 10.0,
        };
        assert_eq!(clip.frame_count(), 11);
        let empty = Clip {
            duration: Duration::ZERO,
            fps: 30.0,
        };
        assert_eq!(empty.frame_count(), 1);
        let exact = Clip {
            duration: Duration::from_millis(100),
            fps: 30.0,
        };
        assert_eq!(exact.frame_count(), 3);
    }

    #[test]
    fn histogram_reports_hex_colors() {
        let mut buffer = PixelBuffer::filled(3, 1, [255, 0, 0, 255]).unwrap();
        buffer.set_pixel(2, 0, [0, 0, 255, 255]);
        let counts = histogram(&buffer, 1);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].color, "#ff0000ff");
        assert_eq!(counts[0].count, 2);
    }

    #[test]
    fn convolve_job_writes_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("nested/out.png");
        provider::save(&PixelBuffer::filled(4, 4, [90, 90, 90, 255]).unwrap(), &input).unwrap();

        let config = filterconfig::FilterConfig::from_toml_str(&format!(
            "version = 1\n\n[[jobs]]\nkind = \"convolve\"\ninput = {input:?}\noutput = {output:?}\npreset = \"identity\"\n",
            input = input.display().to_string(),
            output = output.display().to_string(),
        ))
        .unwrap();
        let mut gpu = Gpu::new(PipelineOptions::default());
        run_job(&config.jobs[0], &config.defaults, &mut gpu).unwrap();

        let written = provider::load(&output).unwrap();
        assert_eq!(written.pixel(1, 1), Some([90, 90, 90, 255]));
    }
}
