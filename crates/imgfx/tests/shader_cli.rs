use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use raster::{provider, PixelBuffer};
use shaderfx::{GpuContext, PipelineOptions, IDENTITY_FRAGMENT};
use tempfile::TempDir;

const SOLID_FRAGMENT: &str = r"precision mediump float;
varying vec2 vTextureCoord;
uniform vec4 uColor;

void main(void) {
    gl_FragColor = uColor;
}
";

const TIME_FRAGMENT: &str = r"precision mediump float;
varying vec2 vTextureCoord;
uniform float uTime;

void main(void) {
    gl_FragColor = vec4(uTime, 0.0, 0.0, 1.0);
}
";

const BROKEN_FRAGMENT: &str = "void main() { gl_FragColor = not_a_function(); }";

fn gpu_available() -> bool {
    match GpuContext::acquire(&PipelineOptions::default()) {
        Ok(_) => true,
        Err(err) if err.is_unsupported_backend() => {
            eprintln!("skipping GPU CLI test: {err}");
            false
        }
        Err(err) => panic!("unexpected context error: {err}"),
    }
}

fn imgfx() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_imgfx"));
    command.env("RUST_LOG", "warn");
    command
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn write_source(dir: &Path) -> PathBuf {
    let mut buffer = PixelBuffer::filled(4, 4, [30, 60, 90, 255]).unwrap();
    buffer.set_pixel(1, 2, [200, 10, 10, 255]);
    let path = dir.join("source.png");
    provider::save(&buffer, &path).unwrap();
    path
}

fn write_fragment(dir: &Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, source).unwrap();
    path
}

fn frame_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn identity_shader_reproduces_input() {
    if !gpu_available() {
        return;
    }
    let root = TempDir::new().unwrap();
    let input = write_source(root.path());
    let fragment = write_fragment(root.path(), "identity.frag", IDENTITY_FRAGMENT);
    let output = root.path().join("identity.png");

    let status = imgfx()
        .args(["shader", arg(&input), "-o", arg(&output), "--fragment", arg(&fragment)])
        .status()
        .expect("failed to run imgfx shader");

    assert!(status.success());
    assert_eq!(provider::load(&output).unwrap(), provider::load(&input).unwrap());
}

#[test]
fn uniform_argument_reaches_the_shader() {
    if !gpu_available() {
        return;
    }
    let root = TempDir::new().unwrap();
    let input = write_source(root.path());
    let fragment = write_fragment(root.path(), "solid.frag", SOLID_FRAGMENT);
    let output = root.path().join("solid.png");

    let status = imgfx()
        .args([
            "shader",
            arg(&input),
            "-o",
            arg(&output),
            "--fragment",
            arg(&fragment),
            "--uniform",
            "uColor:4f:0,0,1,1",
        ])
        .status()
        .expect("failed to run imgfx shader");

    assert!(status.success());
    let result = provider::load(&output).unwrap();
    assert!(result.pixels().all(|px| px == [0, 0, 255, 255]));
}

#[test]
fn strict_shaders_turn_compile_errors_into_failures() {
    if !gpu_available() {
        return;
    }
    let root = TempDir::new().unwrap();
    let input = write_source(root.path());
    let fragment = write_fragment(root.path(), "broken.frag", BROKEN_FRAGMENT);
    let lenient = root.path().join("lenient.png");
    let strict = root.path().join("strict.png");

    let status = imgfx()
        .args(["shader", arg(&input), "-o", arg(&lenient), "--fragment", arg(&fragment)])
        .status()
        .expect("failed to run imgfx shader");
    assert!(status.success());
    assert_eq!(provider::load(&lenient).unwrap(), provider::load(&input).unwrap());

    let status = imgfx()
        .args([
            "shader",
            arg(&input),
            "-o",
            arg(&strict),
            "--fragment",
            arg(&fragment),
            "--strict-shaders",
        ])
        .status()
        .expect("failed to run imgfx shader");
    assert!(!status.success());
    assert!(!strict.exists());
}

#[test]
fn animate_writes_one_file_per_frame() {
    if !gpu_available() {
        return;
    }
    let root = TempDir::new().unwrap();
    let input = write_source(root.path());
    let fragment = write_fragment(root.path(), "time.frag", TIME_FRAGMENT);
    let frames = root.path().join("frames");

    let status = imgfx()
        .args([
            "animate",
            arg(&input),
            "-o",
            arg(&frames),
            "--fragment",
            arg(&fragment),
            "--animate",
            "uTime=time",
            "--duration",
            "100ms",
            "--fps",
            "30",
        ])
        .status()
        .expect("failed to run imgfx animate");

    assert!(status.success());
    assert_eq!(
        frame_files(&frames),
        vec!["frame_00000.png", "frame_00001.png", "frame_00002.png"]
    );
    let first = provider::load(&frames.join("frame_00000.png")).unwrap();
    assert!(first.pixels().all(|px| px == [0, 0, 0, 255]));
    let last = provider::load(&frames.join("frame_00002.png")).unwrap();
    assert!(last.pixels().all(|px| px[0] > 0 && px[3] == 255));
}

#[test]
fn animate_stops_at_the_first_unwritable_frame() {
    if !gpu_available() {
        return;
    }
    let root = TempDir::new().unwrap();
    let input = write_source(root.path());
    let fragment = write_fragment(root.path(), "time.frag", TIME_FRAGMENT);
    let frames = root.path().join("frames");
    fs::create_dir_all(frames.join("frame_00001.png")).unwrap();

    let status = imgfx()
        .args([
            "animate",
            arg(&input),
            "-o",
            arg(&frames),
            "--fragment",
            arg(&fragment),
            "--animate",
            "uTime=time",
            "--duration",
            "1s",
            "--fps",
            "10",
        ])
        .status()
        .expect("failed to run imgfx animate");

    assert!(!status.success());
    assert!(frames.join("frame_00000.png").is_file());
    assert!(!frames.join("frame_00002.png").exists());
}

#[test]
fn run_executes_shader_and_animate_jobs() {
    if !gpu_available() {
        return;
    }
    let root = TempDir::new().unwrap();
    let input = write_source(root.path());
    let solid = write_fragment(root.path(), "solid.frag", SOLID_FRAGMENT);
    let time = write_fragment(root.path(), "time.frag", TIME_FRAGMENT);
    let tinted = root.path().join("tinted.png");
    let frames = root.path().join("frames");
    let config = root.path().join("jobs.toml");

    fs::write(
        &config,
        format!(
            r#"version = 1

[[jobs]]
name = "tint"
kind = "shader"
input = '{input}'
output = '{tinted}'
fragment = '{solid}'

[[jobs.uniforms]]
name = "uColor"
type = "4f"
values = [1.0, 0.0, 0.0, 1.0]

[[jobs]]
name = "pulse"
kind = "animate"
input = '{input}'
output = '{frames}'
fragment = '{time}'
duration = "200ms"
fps = 10

[[jobs.uniforms]]
name = "uTime"
type = "1f"
animate = "time"
"#,
            input = input.display(),
            tinted = tinted.display(),
            solid = solid.display(),
            frames = frames.display(),
            time = time.display(),
        ),
    )
    .unwrap();

    let status = imgfx()
        .args(["run", arg(&config)])
        .status()
        .expect("failed to run imgfx run");

    assert!(status.success());
    let result = provider::load(&tinted).unwrap();
    assert!(result.pixels().all(|px| px == [255, 0, 0, 255]));
    assert_eq!(
        frame_files(&frames),
        vec!["frame_00000.png", "frame_00001.png"]
    );
}
