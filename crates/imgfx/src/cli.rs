use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use raster::KernelPreset;
use shaderfx::{BackendPreference, GpuPowerPreference};

#[derive(Parser, Debug)]
#[command(
    name = "imgfx",
    author,
    version,
    about = "Convolution kernels and GPU fragment-shader filters for images"
)]
pub struct Cli {
    #[command(flatten)]
    pub gpu: GpuArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convolve an image with a preset or explicit kernel.
    Convolve(ConvolveArgs),
    /// Run a fragment shader over an image once.
    Shader(ShaderArgs),
    /// Render an animated fragment shader to numbered PNG frames.
    Animate(AnimateArgs),
    /// Convert to luminance grayscale, keeping alpha.
    Grayscale(IoArgs),
    /// Convert to opaque black and white at 50% luminance.
    Threshold(IoArgs),
    /// Print the most frequent colours of an image.
    Histogram(HistogramArgs),
    /// Execute every job in a TOML job file.
    Run(RunArgs),
}

#[derive(Args, Debug, Clone, Copy)]
pub struct GpuArgs {
    /// Backends to try: `auto` (primary, then GL, then software), `primary`, or `gl`.
    #[arg(
        long,
        global = true,
        value_name = "SET",
        value_parser = parse_backend,
        default_value = "auto"
    )]
    pub backend: BackendPreference,

    /// Adapter power profile: `low` or `high`.
    #[arg(
        long,
        global = true,
        value_name = "PROFILE",
        value_parser = parse_power,
        default_value = "low"
    )]
    pub gpu_power: GpuPowerPreference,
}

#[derive(Args, Debug, Clone)]
pub struct IoArgs {
    /// Source image (PNG, JPEG, BMP, or GIF).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Destination; the format follows the extension.
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    /// Redraw the source onto a canvas of this size first (e.g. `640x480`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_scale)]
    pub scale: Option<(u32, u32)>,

    /// Keep the source aspect ratio when scaling.
    #[arg(long, requires = "scale")]
    pub proportional: bool,
}

#[derive(Args, Debug)]
pub struct ConvolveArgs {
    #[command(flatten)]
    pub io: IoArgs,

    /// Named kernel: identity, box-blur, sharpen, edge-detect, emboss.
    #[arg(long, value_name = "NAME", conflicts_with = "weights")]
    pub preset: Option<KernelPreset>,

    /// Comma separated row-major weights.
    #[arg(long, value_name = "W,W,...", value_delimiter = ',', requires = "width")]
    pub weights: Option<Vec<f64>>,

    /// Kernel width; must be odd and match the number of weights.
    #[arg(long, value_name = "N")]
    pub width: Option<u32>,
}

#[derive(Args, Debug)]
pub struct ShaderArgs {
    #[command(flatten)]
    pub io: IoArgs,

    /// GLSL fragment shader source file.
    #[arg(long, value_name = "PATH")]
    pub fragment: PathBuf,

    /// Uniform as `NAME:TYPE:V1,V2,...` with TYPE one of 1f..4f, 1i..4i. Repeatable.
    #[arg(long = "uniform", value_name = "SPEC")]
    pub uniforms: Vec<String>,

    /// Fail on shader compile errors and uniform type mismatches.
    #[arg(long)]
    pub strict_shaders: bool,
}

#[derive(Args, Debug)]
pub struct AnimateArgs {
    #[command(flatten)]
    pub shader: ShaderArgs,

    /// Drive a `1f` uniform from the timestamp as `NAME=time` or `NAME=sin-time`. Repeatable.
    #[arg(long = "animate", value_name = "NAME=EXPR")]
    pub animated: Vec<String>,

    /// Length of the rendered clip (e.g. `2s`, `500ms`).
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration, default_value = "1s")]
    pub duration: Duration,

    /// Frames per second of the rendered clip.
    #[arg(long, value_name = "FPS", default_value_t = 30.0)]
    pub fps: f32,
}

#[derive(Args, Debug)]
pub struct HistogramArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// How many colours to list.
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub top: usize,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Job file; defaults to `jobs.toml` in the imgfx config directory.
    #[arg(value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Keep going after a job fails.
    #[arg(long)]
    pub keep_going: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_scale(value: &str) -> Result<(u32, u32), String> {
    filterconfig::parse_scale(value).map_err(|err| err.to_string())
}

pub fn parse_backend(value: &str) -> Result<BackendPreference, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "default" => Ok(BackendPreference::Auto),
        "primary" | "vulkan" | "metal" | "dx12" => Ok(BackendPreference::Primary),
        "gl" | "gles" | "opengl" => Ok(BackendPreference::Gl),
        other => Err(format!(
            "unknown backend set '{other}'; expected auto, primary, or gl"
        )),
    }
}

pub fn parse_power(value: &str) -> Result<GpuPowerPreference, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "low" | "low-power" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" => Ok(GpuPowerPreference::High),
        other => Err(format!("unknown GPU power profile '{other}'; expected low or high")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_convolve_with_weights() {
        let cli = Cli::try_parse_from([
            "imgfx", "convolve", "in.png", "-o", "out.png", "--weights", "0,0,0,0,1,0,0,0,0",
            "--width", "3",
        ])
        .unwrap();
        let Command::Convolve(args) = cli.command else {
            panic!("expected convolve");
        };
        assert_eq!(args.weights.as_ref().map(Vec::len), Some(9));
        assert_eq!(args.width, Some(3));
        assert!(args.preset.is_none());
    }

    #[test]
    fn preset_and_weights_conflict() {
        let result = Cli::try_parse_from([
            "imgfx", "convolve", "in.png", "-o", "out.png", "--preset", "sharpen", "--weights",
            "1", "--width", "1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_animation_flags() {
        let cli = Cli::try_parse_from([
            "imgfx",
            "animate",
            "in.png",
            "-o",
            "frames",
            "--fragment",
            "wave.frag",
            "--animate",
            "uTime=time",
            "--duration",
            "250ms",
            "--fps",
            "12",
            "--backend",
            "gl",
        ])
        .unwrap();
        assert_eq!(cli.gpu.backend, BackendPreference::Gl);
        let Command::Animate(args) = cli.command else {
            panic!("expected animate");
        };
        assert_eq!(args.duration, Duration::from_millis(250));
        assert_eq!(args.fps, 12.0);
        assert_eq!(args.animated, vec!["uTime=time".to_string()]);
    }

    #[test]
    fn scale_requires_dimensions() {
        assert_eq!(parse_scale("64x32").unwrap(), (64, 32));
        assert!(parse_scale("64").is_err());
    }

    #[test]
    fn backend_names() {
        assert_eq!(parse_backend("Vulkan").unwrap(), BackendPreference::Primary);
        assert!(parse_backend("cuda").is_err());
    }
}
