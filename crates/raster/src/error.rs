use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode image {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl RasterError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        RasterError::InvalidArgument(message.into())
    }
}
