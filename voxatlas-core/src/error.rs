//! Error types for voxatlas-core.

use thiserror::Error;

/// Result type alias for voxatlas operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for voxatlas operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A buffer length does not match the declared atlas or volume dimensions.
    #[error("dimension mismatch for {what}: expected {expected} bytes, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A channel index was at or beyond the channel count.
    #[error("channel index {index} out of range (channel count {count})")]
    ChannelIndexOutOfRange { index: usize, count: usize },

    /// Voxel coordinate outside the volume.
    #[error("voxel coordinate out of bounds: ({x}, {y}, {z})")]
    OutOfBounds { x: usize, y: usize, z: usize },

    /// Tile grid description is inconsistent.
    #[error("invalid atlas layout: {0}")]
    InvalidLayout(String),

    /// A statistic was requested from a histogram with no samples.
    #[error("histogram has no samples")]
    EmptyHistogram,

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Checks that `index` addresses one of `count` channels.
    pub fn check_channel(index: usize, count: usize) -> Result<()> {
        if index < count {
            Ok(())
        } else {
            Err(Error::ChannelIndexOutOfRange { index, count })
        }
    }
}
