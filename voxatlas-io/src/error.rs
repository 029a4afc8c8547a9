//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Manifest or settings parse error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] voxatlas_core::Error),
}

impl Error {
    /// Converts to a core error for reporting through volume events.
    ///
    /// Core errors pass through; everything else becomes a configuration error
    /// carrying the message.
    #[must_use]
    pub fn into_core(self) -> voxatlas_core::Error {
        match self {
            Error::Core(error) => error,
            other => voxatlas_core::Error::ConfigError(other.to_string()),
        }
    }
}
