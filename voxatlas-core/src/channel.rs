//! Per-channel voxel storage.
//!
//! A `ChannelBuffer` holds one channel's intensities as a dense volume and,
//! when the data arrived as an atlas, the atlas plane it was unpacked from.
//! The histogram is cached against a data version that is bumped on every
//! successful write.

use log::debug;

use crate::atlas::{self, AtlasImage};
use crate::error::{Error, Result};
use crate::histogram::Histogram;
use crate::image_info::{AtlasLayout, VolumeDims};
use crate::lut::{ColorPalette, Lut, LutStrategy};

#[derive(Debug, Clone)]
struct HistogramCache {
    version: u64,
    histogram: Histogram,
}

/// One channel's intensity data plus its derived histogram and LUT.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    name: String,
    dims: VolumeDims,
    atlas: Option<AtlasImage>,
    volume: Vec<u8>,
    loaded: bool,
    version: u64,
    histogram: Option<HistogramCache>,
    lut: Lut,
    palette: Option<ColorPalette>,
    label_colors: bool,
    palette_alpha: f32,
}

impl ChannelBuffer {
    /// Creates an empty, unloaded channel.
    #[must_use]
    pub fn new(name: impl Into<String>, dims: VolumeDims) -> Self {
        Self {
            name: name.into(),
            dims,
            atlas: None,
            volume: Vec::new(),
            loaded: false,
            version: 0,
            histogram: None,
            lut: Lut::identity(),
            palette: None,
            label_colors: false,
            palette_alpha: 0.0,
        }
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Volume dimensions.
    #[must_use]
    pub fn dims(&self) -> VolumeDims {
        self.dims
    }

    /// Returns true once data has been received and unpacked.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Counter bumped on every successful data write.
    #[must_use]
    pub fn data_version(&self) -> u64 {
        self.version
    }

    /// Dense volume data, x-fastest. Empty until loaded.
    #[must_use]
    pub fn volume_data(&self) -> &[u8] {
        &self.volume
    }

    /// Atlas plane the volume was unpacked from, if the data came as an atlas.
    #[must_use]
    pub fn atlas(&self) -> Option<&AtlasImage> {
        self.atlas.as_ref()
    }

    /// Stores an atlas plane and unpacks it into the volume.
    ///
    /// On error the channel keeps its previous contents.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the atlas length or size does not
    /// match `layout`, or if `layout` describes a different volume.
    pub fn set_from_atlas(
        &mut self,
        data: Vec<u8>,
        width: usize,
        height: usize,
        layout: &AtlasLayout,
    ) -> Result<()> {
        let expected = layout.volume_dims();
        if expected != self.dims {
            return Err(Error::DimensionMismatch {
                what: "atlas tile grid",
                expected: self.dims.voxel_count(),
                actual: expected.voxel_count(),
            });
        }
        let image = AtlasImage::new(data, width, height)?;
        let volume = atlas::unpack(&image, layout)?;
        self.atlas = Some(image);
        self.commit(volume);
        debug!(
            "channel '{}': unpacked {}x{} atlas into {} voxels",
            self.name,
            width,
            height,
            self.volume.len()
        );
        Ok(())
    }

    /// Stores a dense volume directly. Any previous atlas plane is dropped.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the length is not the voxel count.
    pub fn set_from_volume(&mut self, data: Vec<u8>) -> Result<()> {
        if data.len() != self.dims.voxel_count() {
            return Err(Error::DimensionMismatch {
                what: "volume",
                expected: self.dims.voxel_count(),
                actual: data.len(),
            });
        }
        self.atlas = None;
        self.commit(data);
        debug!("channel '{}': stored {} voxels", self.name, self.volume.len());
        Ok(())
    }

    fn commit(&mut self, volume: Vec<u8>) {
        self.volume = volume;
        self.loaded = true;
        self.version += 1;
        self.histogram = None;
        if self.label_colors {
            self.apply_label_colors();
        }
    }

    /// Re-tiles the volume into an atlas plane, e.g. for texture upload after
    /// [`Self::set_from_volume`].
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the channel is unloaded or the
    /// layout describes a different volume.
    pub fn to_atlas(&self, layout: &AtlasLayout) -> Result<AtlasImage> {
        if let Some(image) = &self.atlas {
            if image.width == layout.atlas_width && image.height == layout.atlas_height {
                return Ok(image.clone());
            }
        }
        atlas::pack(&self.volume, layout)
    }

    /// Reads one voxel.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] outside the volume or before data is loaded.
    pub fn intensity(&self, x: usize, y: usize, z: usize) -> Result<u8> {
        self.dims
            .index(x, y, z)
            .and_then(|i| self.volume.get(i).copied())
            .ok_or(Error::OutOfBounds { x, y, z })
    }

    /// Histogram of the current data, rebuilt if the data changed since the
    /// last call. An unloaded channel has an empty histogram.
    pub fn histogram(&mut self) -> &Histogram {
        if self.cached_histogram().is_none() {
            self.histogram = None;
        }
        let (name, version, volume) = (&self.name, self.version, &self.volume);
        &self
            .histogram
            .get_or_insert_with(|| {
                debug!("channel '{name}': rebuilding histogram (version {version})");
                HistogramCache {
                    version,
                    histogram: Histogram::build(volume),
                }
            })
            .histogram
    }

    /// Cached histogram if it matches the current data.
    #[must_use]
    pub fn cached_histogram(&self) -> Option<&Histogram> {
        self.histogram
            .as_ref()
            .filter(|cache| cache.version == self.version)
            .map(|cache| &cache.histogram)
    }

    /// Active LUT.
    #[must_use]
    pub fn lut(&self) -> &Lut {
        &self.lut
    }

    /// Replaces the active LUT.
    pub fn set_lut(&mut self, lut: Lut) {
        self.lut = lut;
    }

    /// Generates a LUT with `strategy`, makes it active and returns it.
    pub fn apply_lut_strategy(&mut self, strategy: &LutStrategy) -> Lut {
        let lut = self.histogram().generate(strategy);
        self.lut = lut;
        lut
    }

    /// Shorthand for a window/level LUT.
    pub fn apply_window_level(&mut self, window: f32, level: f32) -> Lut {
        self.apply_lut_strategy(&LutStrategy::WindowLevel { window, level })
    }

    /// Label palette, if one is set.
    #[must_use]
    pub fn color_palette(&self) -> Option<&ColorPalette> {
        self.palette.as_ref()
    }

    /// Sets or clears the label palette. An explicit palette is kept as is
    /// when the data changes.
    pub fn set_color_palette(&mut self, palette: Option<ColorPalette>) {
        self.palette = palette;
        self.label_colors = false;
    }

    /// Generates the label palette from the histogram and installs it.
    ///
    /// The palette follows the data: every later write regenerates it, so a
    /// palette requested before loading covers the labels that arrive.
    pub fn apply_label_colors(&mut self) -> ColorPalette {
        let palette = self.histogram().lut_label_colors();
        self.palette = Some(palette);
        self.label_colors = true;
        palette
    }

    /// Returns true if the palette is generated from the channel data.
    #[must_use]
    pub fn has_label_colors(&self) -> bool {
        self.label_colors
    }

    /// Blend factor of the label palette over the LUT color, in `[0, 1]`.
    #[must_use]
    pub fn color_palette_alpha(&self) -> f32 {
        self.palette_alpha
    }

    /// Sets the palette blend factor, clamped to `[0, 1]`.
    pub fn set_color_palette_alpha(&mut self, alpha: f32) {
        self.palette_alpha = alpha.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_layout() -> AtlasLayout {
        AtlasLayout::new(4, 4, 2, 1, 2).unwrap()
    }

    fn scenario_atlas() -> Vec<u8> {
        (0..32).map(|i| if i % 8 < 4 { 10 } else { 200 }).collect()
    }

    #[test]
    fn test_set_from_atlas_scenario() {
        let layout = scenario_layout();
        let mut channel = ChannelBuffer::new("dna", layout.volume_dims());
        assert!(!channel.is_loaded());

        channel.set_from_atlas(scenario_atlas(), 8, 4, &layout).unwrap();
        assert!(channel.is_loaded());
        assert_eq!(channel.intensity(0, 0, 0), Ok(10));
        assert_eq!(channel.intensity(0, 0, 1), Ok(200));
        assert_eq!(channel.intensity(3, 3, 1), Ok(200));
        assert_eq!(
            channel.intensity(4, 0, 0),
            Err(Error::OutOfBounds { x: 4, y: 0, z: 0 })
        );
    }

    #[test]
    fn test_dimension_mismatch_leaves_channel_unloaded() {
        let layout = scenario_layout();
        let mut channel = ChannelBuffer::new("dna", layout.volume_dims());
        let err = channel.set_from_atlas(vec![0; 31], 8, 4, &layout);
        assert!(matches!(err, Err(Error::DimensionMismatch { .. })));
        assert!(!channel.is_loaded());

        let err = channel.set_from_volume(vec![0; 33]);
        assert!(matches!(err, Err(Error::DimensionMismatch { .. })));
        assert!(!channel.is_loaded());
        assert_eq!(channel.data_version(), 0);
    }

    #[test]
    fn test_volume_path_drops_atlas() {
        let layout = scenario_layout();
        let mut channel = ChannelBuffer::new("dna", layout.volume_dims());
        channel.set_from_atlas(scenario_atlas(), 8, 4, &layout).unwrap();
        assert!(channel.atlas().is_some());

        channel.set_from_volume(vec![7; 32]).unwrap();
        assert!(channel.atlas().is_none());
        assert_eq!(channel.intensity(1, 1, 1), Ok(7));

        let atlas = channel.to_atlas(&layout).unwrap();
        assert!(atlas.data.iter().all(|&v| v == 7));
    }

    #[test]
    fn test_histogram_cache_follows_data_version() {
        let layout = scenario_layout();
        let mut channel = ChannelBuffer::new("dna", layout.volume_dims());
        assert!(channel.histogram().is_empty());

        channel.set_from_volume(vec![7; 32]).unwrap();
        assert!(channel.cached_histogram().is_none());
        assert_eq!(channel.histogram().bin(7), 32);
        assert!(channel.cached_histogram().is_some());

        channel.set_from_volume(vec![9; 32]).unwrap();
        assert!(channel.cached_histogram().is_none());
        assert_eq!(channel.histogram().bin(9), 32);
        assert_eq!(channel.histogram().bin(7), 0);
    }

    #[test]
    fn test_lut_before_data_is_identity() {
        let mut channel = ChannelBuffer::new("empty", VolumeDims::new(2, 2, 2));
        assert_eq!(channel.apply_lut_strategy(&LutStrategy::Auto), Lut::identity());
        assert_eq!(channel.lut(), &Lut::identity());
    }

    #[test]
    fn test_label_colors_follow_data() {
        let mut channel = ChannelBuffer::new("labels", VolumeDims::new(2, 2, 1));
        let empty = channel.apply_label_colors();
        assert_eq!(empty.get(3), [0, 0, 0, 0]);
        assert!(channel.has_label_colors());

        channel.set_from_volume(vec![0, 3, 3, 5]).unwrap();
        let palette = channel.color_palette().unwrap();
        assert_eq!(palette.get(3)[3], 255);
        assert_eq!(palette.get(5)[3], 255);
        assert_eq!(palette.get(4), [0, 0, 0, 0]);

        let mut fixed = [[0u8; 4]; crate::lut::LUT_SIZE];
        fixed[1] = [9, 9, 9, 255];
        channel.set_color_palette(Some(ColorPalette::from_entries(fixed)));
        assert!(!channel.has_label_colors());
        channel.set_from_volume(vec![1; 4]).unwrap();
        assert_eq!(channel.color_palette().unwrap().get(1), [9, 9, 9, 255]);
        assert_eq!(channel.color_palette().unwrap().get(3), [0, 0, 0, 0]);
    }

    #[test]
    fn test_palette_alpha_clamped() {
        let mut channel = ChannelBuffer::new("labels", VolumeDims::new(2, 2, 2));
        channel.set_color_palette_alpha(1.5);
        assert!((channel.color_palette_alpha() - 1.0).abs() < f32::EPSILON);
    }
}
