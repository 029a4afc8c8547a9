//! Image-info manifests.
//!
//! A manifest is the JSON image description plus the list of atlas images
//! that carry the channel data:
//!
//! ```json
//! {
//!   "width": 306, "height": 494, "channels": 2, "channel_names": ["DNA", "SEG_Memb"],
//!   "rows": 7, "cols": 10, "tiles": 65, "tile_width": 204, "tile_height": 292,
//!   "atlas_width": 2040, "atlas_height": 2044,
//!   "images": [{ "name": "cell_atlas_0.png", "channels": [0, 1] }]
//! }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use voxatlas_core::ImageInfo;

use crate::loader::LoadSource;
use crate::png::MAX_PACKED_CHANNELS;
use crate::{Error, Result};

/// One atlas image and the channels packed into its color planes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasImageEntry {
    /// File name, relative to the manifest.
    pub name: String,
    /// Channel index for each color plane, in R, G, B, A order.
    pub channels: Vec<usize>,
}

/// Image description plus atlas file list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageManifest {
    /// Image description.
    #[serde(flatten)]
    pub info: ImageInfo,
    /// Atlas images, possibly empty when data comes from raw volumes.
    #[serde(default)]
    pub images: Vec<AtlasImageEntry>,
}

impl ImageManifest {
    /// Parses a manifest from JSON text and validates it.
    ///
    /// # Errors
    /// Returns [`Error::Json`] for malformed JSON, or a validation error.
    pub fn from_json(text: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reads a manifest file and validates it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let manifest: Self = serde_json::from_reader(reader)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks the image description and the atlas channel assignments.
    ///
    /// # Errors
    /// Returns [`Error::Core`] for an inconsistent description and
    /// [`Error::InvalidFormat`] for bad image entries.
    pub fn validate(&self) -> Result<()> {
        self.info.validate()?;
        for entry in &self.images {
            if entry.channels.len() > MAX_PACKED_CHANNELS {
                return Err(Error::InvalidFormat(format!(
                    "{}: {} channels packed into one image",
                    entry.name,
                    entry.channels.len()
                )));
            }
            if let Some(&bad) = entry.channels.iter().find(|&&c| c >= self.info.channels) {
                return Err(Error::InvalidFormat(format!(
                    "{}: channel {bad} out of range ({} channels)",
                    entry.name, self.info.channels
                )));
            }
        }
        Ok(())
    }

    /// Load sources for every atlas image, resolved against `base_dir`.
    #[must_use]
    pub fn atlas_sources(&self, base_dir: &Path) -> Vec<LoadSource> {
        self.images
            .iter()
            .map(|entry| LoadSource::Atlas {
                path: resolve(base_dir, &entry.name),
                channels: entry.channels.clone(),
            })
            .collect()
    }

    /// Serializes to pretty JSON.
    ///
    /// # Errors
    /// Returns [`Error::Json`] on serialization failure.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn resolve(base_dir: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
