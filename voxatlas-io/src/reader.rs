//! Memory-mapped readers for raw volume files.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use voxatlas_core::VolumeDims;

use crate::convert::to_u8_min_max;
use crate::{Error, Result};

/// Sample encoding of a raw volume file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// One unsigned byte per voxel.
    #[default]
    U8,
    /// Little-endian unsigned 16-bit, rescaled to 8-bit on read.
    U16,
}

impl SampleFormat {
    /// Bytes per voxel.
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::U16 => 2,
        }
    }
}

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without reading the whole file
/// into memory first.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the reader was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decodes the file as a dense 8-bit volume of `dims`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the file size does not match.
    pub fn read_volume(&self, dims: VolumeDims, format: SampleFormat) -> Result<Vec<u8>> {
        let expected = dims.voxel_count() * format.bytes_per_sample();
        if self.len() != expected {
            return Err(Error::InvalidFormat(format!(
                "{}: expected {expected} bytes for {}x{}x{} {format:?} voxels, found {}",
                self.path.display(),
                dims.x,
                dims.y,
                dims.z,
                self.len()
            )));
        }
        let data = self.as_bytes();
        Ok(match format {
            SampleFormat::U8 => data.to_vec(),
            SampleFormat::U16 => {
                let samples: Vec<u16> = data
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect();
                to_u8_min_max(&samples)
            }
        })
    }
}

/// Reads a raw volume file.
///
/// # Errors
/// Returns an error if the file cannot be mapped or has the wrong size.
pub fn read_raw_volume<P: AsRef<Path>>(
    path: P,
    dims: VolumeDims,
    format: SampleFormat,
) -> Result<Vec<u8>> {
    MappedFileReader::open(path)?.read_volume(dims, format)
}
