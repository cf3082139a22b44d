use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

const UNIFORM_TAGS: [&str; 8] = ["1f", "1i", "2f", "2i", "3f", "3i", "4f", "4i"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A batch of filter jobs, each reading one image and writing one result.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Defaults {
    pub fps: Option<f32>,
    #[serde(default)]
    pub strict_shaders: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Convolve,
    Shader,
    Animate,
    Grayscale,
    Threshold,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Convolve => "convolve",
            JobKind::Shader => "shader",
            JobKind::Animate => "animate",
            JobKind::Grayscale => "grayscale",
            JobKind::Threshold => "threshold",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Job {
    pub name: Option<String>,
    pub kind: JobKind,
    pub input: PathBuf,
    /// An image path, or a directory of numbered frames for `animate`.
    pub output: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
    #[serde(default)]
    pub proportional: bool,

    pub preset: Option<String>,
    pub weights: Option<Vec<f64>>,
    pub width: Option<u32>,

    pub fragment: Option<PathBuf>,
    #[serde(default)]
    pub uniforms: Vec<UniformSpec>,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    pub fps: Option<f32>,
    pub strict_shaders: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UniformSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animate: Option<UniformAnimation>,
}

/// Expression that derives a `1f` uniform from the frame timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UniformAnimation {
    /// Seconds since the animation started.
    Time,
    /// `sin(seconds)`.
    SinTime,
}

impl UniformAnimation {
    pub fn evaluate(self, seconds: f64) -> f64 {
        match self {
            UniformAnimation::Time => seconds,
            UniformAnimation::SinTime => seconds.sin(),
        }
    }
}

/// Parses a `WIDTHxHEIGHT` canvas size such as `640x480`.
pub fn parse_scale(raw: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = || ConfigError::Invalid(format!("invalid scale '{raw}'; expected WIDTHxHEIGHT"));
    let (width, height) = raw
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(invalid)?;
    let width: u32 = width.trim().parse().map_err(|_| invalid())?;
    let height: u32 = height.trim().parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

fn uniform_arity(tag: &str) -> Option<usize> {
    UNIFORM_TAGS
        .iter()
        .position(|known| *known == tag)
        .map(|index| index / 2 + 1)
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl FilterConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: FilterConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.jobs.is_empty() {
            return Err(ConfigError::Invalid(
                "config must define at least one job".into(),
            ));
        }

        if let Some(fps) = self.defaults.fps {
            if !fps.is_finite() || fps < 0.0 {
                return Err(ConfigError::Invalid("defaults.fps must be >= 0".into()));
            }
        }

        for (index, job) in self.jobs.iter().enumerate() {
            job.validate(index)?;
        }

        Ok(())
    }
}

impl Job {
    /// Name used in log lines and error messages.
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("#{} ({})", index + 1, self.kind),
        }
    }

    pub fn resolved_fps(&self, defaults: &Defaults) -> Option<f32> {
        self.fps.or(defaults.fps)
    }

    pub fn resolved_strict(&self, defaults: &Defaults) -> bool {
        self.strict_shaders.unwrap_or(defaults.strict_shaders)
    }

    pub fn canvas(&self) -> Result<Option<(u32, u32)>, ConfigError> {
        self.scale.as_deref().map(parse_scale).transpose()
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let label = self.label(index);
        let invalid = |message: String| ConfigError::Invalid(format!("job '{label}' {message}"));

        if self.input.as_os_str().is_empty() || self.output.as_os_str().is_empty() {
            return Err(invalid("needs both input and output paths".into()));
        }
        self.canvas()?;

        if let Some(fps) = self.fps {
            if !fps.is_finite() || fps < 0.0 {
                return Err(invalid("fps must be >= 0".into()));
            }
        }

        match self.kind {
            JobKind::Convolve => match (&self.preset, &self.weights, self.width) {
                (Some(preset), None, None) => {
                    if preset.trim().is_empty() {
                        return Err(invalid("has an empty preset name".into()));
                    }
                }
                (None, Some(weights), Some(width)) => {
                    if width == 0 || width % 2 == 0 {
                        return Err(invalid(format!("kernel width must be odd, got {width}")));
                    }
                    let expected = (width as usize) * (width as usize);
                    if weights.len() != expected {
                        return Err(invalid(format!(
                            "kernel of width {width} needs {expected} weights, got {}",
                            weights.len()
                        )));
                    }
                }
                _ => {
                    return Err(invalid(
                        "needs either a preset or both weights and width".into(),
                    ))
                }
            },
            JobKind::Shader | JobKind::Animate => {
                if self.fragment.is_none() {
                    return Err(invalid("needs a fragment shader path".into()));
                }
                for uniform in &self.uniforms {
                    validate_uniform(uniform, self.kind).map_err(invalid)?;
                }
                if self.kind == JobKind::Animate {
                    match self.duration {
                        Some(duration) if !duration.is_zero() => {}
                        _ => return Err(invalid("needs a duration greater than zero".into())),
                    }
                }
            }
            JobKind::Grayscale | JobKind::Threshold => {}
        }

        Ok(())
    }
}

fn validate_uniform(uniform: &UniformSpec, kind: JobKind) -> Result<(), String> {
    let name = uniform.name.trim();
    if name.is_empty() {
        return Err("has a uniform with an empty name".into());
    }
    let tag = uniform.kind.trim().to_ascii_lowercase();
    let arity = uniform_arity(&tag).ok_or_else(|| {
        format!(
            "uniform '{name}' has invalid type '{}'; expected one of {}",
            uniform.kind,
            UNIFORM_TAGS.join(", ")
        )
    })?;

    match uniform.animate {
        Some(_) if kind != JobKind::Animate => {
            Err(format!("uniform '{name}' is animated outside an animate job"))
        }
        Some(_) if tag != "1f" => Err(format!("animated uniform '{name}' must have type 1f")),
        Some(_) if !uniform.values.is_empty() => {
            Err(format!("animated uniform '{name}' takes no values"))
        }
        Some(_) => Ok(()),
        None if uniform.values.len() != arity => Err(format!(
            "uniform '{name}' of type {tag} needs {arity} value(s), got {}",
            uniform.values.len()
        )),
        None => Ok(()),
    }
}
