use crate::error::FilterError;
use crate::types::{AdapterProfile, PipelineOptions};

/// Headless device and queue shared by every filter invocation.
///
/// Cloning is cheap; the wgpu handles are reference counted.
#[derive(Clone)]
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    profile: AdapterProfile,
}

impl GpuContext {
    /// Finds an adapter by walking the backend candidates in order, then a
    /// software fallback adapter if the preference allows it.
    pub fn acquire(options: &PipelineOptions) -> Result<Self, FilterError> {
        let power_preference = options.power.to_wgpu();
        let mut attempts = Vec::new();

        for &backends in options.backends.candidates() {
            match request_adapter(backends, power_preference, false) {
                Ok(adapter) => return Self::from_adapter(adapter),
                Err(reason) => {
                    tracing::debug!(?backends, %reason, "no adapter on backend set");
                    attempts.push(format!("{backends:?}: {reason}"));
                }
            }
        }

        if options.backends.allows_fallback_adapter() {
            match request_adapter(wgpu::Backends::all(), power_preference, true) {
                Ok(adapter) => return Self::from_adapter(adapter),
                Err(reason) => attempts.push(format!("fallback adapter: {reason}")),
            }
        }

        Err(FilterError::UnsupportedBackend(attempts.join("; ")))
    }

    fn from_adapter(adapter: wgpu::Adapter) -> Result<Self, FilterError> {
        let info = adapter.get_info();
        let limits = adapter.limits();
        let profile = AdapterProfile::from_wgpu(&info, &limits);
        tracing::debug!(
            name = %profile.name,
            backend = ?profile.backend,
            device_type = ?profile.device_type,
            is_software = profile.is_software(),
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("imgfx device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| {
            FilterError::UnsupportedBackend(format!(
                "failed to create device on {profile}: {err}"
            ))
        })?;

        Ok(Self {
            device,
            queue,
            profile,
        })
    }

    pub fn profile(&self) -> &AdapterProfile {
        &self.profile
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.profile.max_texture_dimension
    }

    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub(crate) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

fn request_adapter(
    backends: wgpu::Backends,
    power_preference: wgpu::PowerPreference,
    force_fallback_adapter: bool,
) -> Result<wgpu::Adapter, String> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends,
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    });
    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference,
        compatible_surface: None,
        force_fallback_adapter,
    }))
    .map_err(|err| err.to_string())
}
