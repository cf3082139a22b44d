use raster::RasterError;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// No adapter or device could be created on any backend we tried.
    #[error("no usable GPU backend: {0}")]
    UnsupportedBackend(String),
    /// Malformed uniform descriptor or unusable input buffer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Only surfaced under [`ShaderValidation::Strict`](crate::ShaderValidation::Strict).
    #[error("shader failed to compile: {0}")]
    ShaderCompile(String),
    #[error("GPU readback failed: {0}")]
    Readback(String),
    #[error("animation worker panicked")]
    WorkerPanicked,
    #[error(transparent)]
    Scheduler(#[from] scheduler::SchedulerError),
    #[error(transparent)]
    Raster(#[from] RasterError),
}

impl FilterError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        FilterError::InvalidArgument(message.into())
    }

    pub fn is_unsupported_backend(&self) -> bool {
        matches!(self, FilterError::UnsupportedBackend(_))
    }
}
