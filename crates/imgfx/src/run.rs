use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use filterconfig::FilterConfig;
use shaderfx::{PipelineOptions, ShaderValidation, UniformDescriptor};
use tracing_subscriber::EnvFilter;

use crate::bindings::{kernel_from_args, parse_animated_arg, parse_uniform_arg, FrameUniforms};
use crate::cli::{
    AnimateArgs, Cli, Command, ConvolveArgs, GpuArgs, HistogramArgs, IoArgs, RunArgs, ShaderArgs,
};
use crate::jobs::{self, Clip, Gpu};
use crate::paths::AppPaths;

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let mut gpu = Gpu::new(pipeline_options(cli.gpu));
    match cli.command {
        Command::Convolve(args) => run_convolve(&args),
        Command::Shader(args) => run_shader(&args, &mut gpu),
        Command::Animate(args) => run_animate(&args, &mut gpu),
        Command::Grayscale(args) => run_recolor(&args, jobs::grayscale),
        Command::Threshold(args) => run_recolor(&args, jobs::threshold),
        Command::Histogram(args) => run_histogram(&args),
        Command::Run(args) => run_jobs(&args, &mut gpu),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn pipeline_options(args: GpuArgs) -> PipelineOptions {
    PipelineOptions {
        validation: ShaderValidation::default(),
        power: args.gpu_power,
        backends: args.backend,
    }
}

fn load(io: &IoArgs) -> Result<raster::PixelBuffer> {
    jobs::load_source(&io.input, io.scale, io.proportional)
}

fn run_convolve(args: &ConvolveArgs) -> Result<()> {
    let kernel = kernel_from_args(args.preset, args.weights.as_deref(), args.width)?;
    let source = load(&args.io)?;
    tracing::info!(input = %args.io.input.display(), width = kernel.width(), "convolving image");
    jobs::write_image(&jobs::convolve(&source, &kernel), &args.io.output)
}

fn shader_uniforms(args: &ShaderArgs) -> Result<Vec<UniformDescriptor>> {
    args.uniforms
        .iter()
        .map(|raw| parse_uniform_arg(raw))
        .collect()
}

fn run_shader(args: &ShaderArgs, gpu: &mut Gpu) -> Result<()> {
    let uniforms = shader_uniforms(args)?;
    let source = load(&args.io)?;
    tracing::info!(
        fragment = %args.fragment.display(),
        uniforms = uniforms.len(),
        strict = args.strict_shaders,
        "applying shader"
    );
    let output = jobs::shader(gpu, source, &args.fragment, &uniforms, args.strict_shaders)?;
    jobs::write_image(&output, &args.io.output)
}

fn run_animate(args: &AnimateArgs, gpu: &mut Gpu) -> Result<()> {
    let shader = &args.shader;
    let animated = args
        .animated
        .iter()
        .map(|raw| parse_animated_arg(raw))
        .collect::<Result<Vec<_>>>()?;
    let uniforms = FrameUniforms::new(&shader_uniforms(shader)?, animated)?;
    let source = load(&shader.io)?;
    let clip = Clip {
        duration: args.duration,
        fps: args.fps,
    };
    tracing::info!(
        fragment = %shader.fragment.display(),
        frames = clip.frame_count(),
        fps = clip.fps,
        "rendering animation"
    );
    jobs::animate(
        gpu,
        &source,
        &shader.fragment,
        uniforms,
        clip,
        shader.strict_shaders,
        &shader.io.output,
    )
    .map(|_| ())
}

fn run_recolor(args: &IoArgs, recolor: fn(raster::PixelBuffer) -> raster::PixelBuffer) -> Result<()> {
    let source = load(args)?;
    jobs::write_image(&recolor(source), &args.output)
}

fn run_histogram(args: &HistogramArgs) -> Result<()> {
    let source = jobs::load_source(&args.input, None, false)?;
    let counts = jobs::histogram(&source, args.top);
    if args.json {
        let rendered =
            serde_json::to_string_pretty(&counts).context("failed to serialise histogram")?;
        println!("{rendered}");
    } else {
        for entry in &counts {
            println!("{}  {:>10}", entry.color, entry.count);
        }
    }
    Ok(())
}

fn resolve_config_path(args: &RunArgs) -> Result<PathBuf> {
    if let Some(path) = &args.config {
        return Ok(path.clone());
    }
    let paths = AppPaths::discover()?;
    tracing::debug!(config = %paths.config_dir().display(), "resolved imgfx paths");
    Ok(paths.default_jobs_file())
}

fn run_jobs(args: &RunArgs, gpu: &mut Gpu) -> Result<()> {
    let path = resolve_config_path(args)?;
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read job file {}", path.display()))?;
    let config = FilterConfig::from_toml_str(&raw)
        .with_context(|| format!("failed to parse job file {}", path.display()))?;
    tracing::info!(jobs = config.jobs.len(), path = %path.display(), "running job file");

    let mut failed = 0usize;
    for (index, job) in config.jobs.iter().enumerate() {
        let label = job.label(index);
        tracing::info!(job = %label, kind = %job.kind, "starting job");
        match jobs::run_job(job, &config.defaults, gpu) {
            Ok(()) => tracing::info!(job = %label, "job finished"),
            Err(err) if args.keep_going => {
                failed += 1;
                tracing::error!(job = %label, error = %format!("{err:#}"), "job failed");
            }
            Err(err) => return Err(err).with_context(|| format!("job '{label}' failed")),
        }
    }

    if failed > 0 {
        bail!("{failed} of {} jobs failed", config.jobs.len());
    }
    Ok(())
}
