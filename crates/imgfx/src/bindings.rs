use anyhow::{anyhow, bail, Context, Result};
use filterconfig::{Job, UniformAnimation, UniformSpec};
use raster::{Kernel, KernelPreset};
use shaderfx::{resolve_all, ShaderUniform, TimeSample, UniformDescriptor};

/// Parses `NAME:TYPE:V1,V2,...` from the command line.
pub fn parse_uniform_arg(raw: &str) -> Result<UniformDescriptor> {
    let mut parts = raw.splitn(3, ':');
    let (Some(name), Some(kind), Some(values)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("invalid shader var specified: '{raw}'; expected NAME:TYPE:V1,V2,...");
    };
    let values = values
        .split(',')
        .map(|value| {
            value
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid value '{value}' for uniform '{name}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(UniformDescriptor::new(name.trim(), kind.trim(), values))
}

/// Parses `NAME=time` or `NAME=sin-time`.
pub fn parse_animated_arg(raw: &str) -> Result<(String, UniformAnimation)> {
    let (name, expression) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid animated uniform '{raw}'; expected NAME=EXPR"))?;
    let animation = match expression.trim().to_ascii_lowercase().as_str() {
        "time" | "t" => UniformAnimation::Time,
        "sin-time" | "sin" => UniformAnimation::SinTime,
        other => bail!("unknown animation expression '{other}'; expected time or sin-time"),
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("animated uniform needs a name: '{raw}'");
    }
    Ok((name.to_string(), animation))
}

pub fn descriptor_from_spec(spec: &UniformSpec) -> UniformDescriptor {
    UniformDescriptor::new(spec.name.clone(), spec.kind.clone(), spec.values.clone())
}

/// Fixed uniforms plus the ones recomputed from each frame's timestamp.
#[derive(Debug, Clone, Default)]
pub struct FrameUniforms {
    fixed: Vec<ShaderUniform>,
    animated: Vec<(String, UniformAnimation)>,
}

impl FrameUniforms {
    pub fn new(
        fixed: &[UniformDescriptor],
        animated: Vec<(String, UniformAnimation)>,
    ) -> Result<Self> {
        let fixed = resolve_all(fixed)?;
        Ok(Self { fixed, animated })
    }

    pub fn from_specs(specs: &[UniformSpec]) -> Result<Self> {
        let fixed: Vec<_> = specs
            .iter()
            .filter(|spec| spec.animate.is_none())
            .map(descriptor_from_spec)
            .collect();
        let animated = specs
            .iter()
            .filter_map(|spec| spec.animate.map(|animation| (spec.name.clone(), animation)))
            .collect();
        Self::new(&fixed, animated)
    }

    pub fn at(&self, sample: TimeSample) -> Vec<ShaderUniform> {
        let mut uniforms = self.fixed.clone();
        uniforms.extend(self.animated.iter().map(|(name, animation)| {
            ShaderUniform::one_f(name.clone(), animation.evaluate(sample.seconds) as f32)
        }));
        uniforms
    }
}

pub fn kernel_from_args(
    preset: Option<KernelPreset>,
    weights: Option<&[f64]>,
    width: Option<u32>,
) -> Result<Kernel> {
    match (preset, weights, width) {
        (Some(preset), None, _) => Ok(preset.kernel()),
        (None, Some(weights), Some(width)) => {
            Kernel::new(weights.to_vec(), width).context("invalid kernel")
        }
        (None, None, None) => Ok(KernelPreset::BoxBlur.kernel()),
        _ => bail!("specify either --preset or both --weights and --width"),
    }
}

pub fn kernel_from_job(job: &Job) -> Result<Kernel> {
    let preset = job
        .preset
        .as_deref()
        .map(str::parse::<KernelPreset>)
        .transpose()?;
    kernel_from_args(preset, job.weights.as_deref(), job.width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uniform_argument() {
        let descriptor = parse_uniform_arg("uTint:4f:1, 0.5,0.25,1").unwrap();
        assert_eq!(descriptor.name, "uTint");
        assert_eq!(descriptor.kind, "4f");
        assert_eq!(descriptor.values, vec![1.0, 0.5, 0.25, 1.0]);
    }

    #[test]
    fn rejects_malformed_uniform_argument() {
        assert!(parse_uniform_arg("uTint").is_err());
        assert!(parse_uniform_arg("uTint:1f:abc").is_err());
    }

    #[test]
    fn unknown_uniform_type_fails_resolution() {
        let descriptor = parse_uniform_arg("uTint:5f:1,2,3,4,5").unwrap();
        assert!(FrameUniforms::new(&[descriptor], Vec::new()).is_err());
    }

    #[test]
    fn animated_uniforms_follow_time() {
        let uniforms = FrameUniforms::new(
            &[UniformDescriptor::new("uAmount", "1f", vec![0.5])],
            vec![parse_animated_arg("uTime=time").unwrap()],
        )
        .unwrap();
        let frame = uniforms.at(TimeSample::new(2.0, 60));
        assert_eq!(
            frame,
            vec![
                ShaderUniform::one_f("uAmount", 0.5),
                ShaderUniform::one_f("uTime", 2.0)
            ]
        );
    }

    #[test]
    fn rejects_unknown_expression() {
        assert!(parse_animated_arg("uTime=cos").is_err());
        assert!(parse_animated_arg("=time").is_err());
    }

    #[test]
    fn kernel_defaults_to_box_blur() {
        let kernel = kernel_from_args(None, None, None).unwrap();
        assert_eq!(kernel, KernelPreset::BoxBlur.kernel());
        assert!(kernel_from_args(None, Some(&[1.0; 4]), Some(2)).is_err());
    }
}
