use std::fmt;

/// What to do when a fragment shader fails to compile or link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderValidation {
    /// Log the failure and skip the draw; the destination buffer comes back
    /// unfiltered. Uniform type mismatches are logged and ignored.
    #[default]
    Permissive,
    /// Surface compile/link failures as [`FilterError::ShaderCompile`] and
    /// uniform type mismatches as [`FilterError::InvalidArgument`].
    ///
    /// [`FilterError::ShaderCompile`]: crate::FilterError::ShaderCompile
    /// [`FilterError::InvalidArgument`]: crate::FilterError::InvalidArgument
    Strict,
}

/// Preferred GPU power profile when several adapters are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

impl GpuPowerPreference {
    pub(crate) fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// Which backend generations to try when acquiring a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendPreference {
    /// Primary backends (Vulkan, Metal, DX12), then GL, then a software adapter.
    #[default]
    Auto,
    /// Primary backends only.
    Primary,
    /// OpenGL / GLES only.
    Gl,
}

impl BackendPreference {
    pub(crate) fn candidates(self) -> &'static [wgpu::Backends] {
        match self {
            BackendPreference::Auto => &[wgpu::Backends::PRIMARY, wgpu::Backends::SECONDARY],
            BackendPreference::Primary => &[wgpu::Backends::PRIMARY],
            BackendPreference::Gl => &[wgpu::Backends::GL],
        }
    }

    pub(crate) fn allows_fallback_adapter(self) -> bool {
        matches!(self, BackendPreference::Auto)
    }
}

/// Knobs for [`GpuFilterPipeline`](crate::GpuFilterPipeline) and
/// [`GpuContext::acquire`](crate::GpuContext::acquire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineOptions {
    pub validation: ShaderValidation,
    pub power: GpuPowerPreference,
    pub backends: BackendPreference,
}

impl PipelineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self) -> Self {
        self.validation = ShaderValidation::Strict;
        self
    }
}

/// Summary of the adapter backing a [`GpuContext`](crate::GpuContext).
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub driver: String,
    pub max_texture_dimension: u32,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            driver: info.driver.clone(),
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

impl fmt::Display for AdapterProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}
