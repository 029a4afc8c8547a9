//! Channel buffers for one volume plus the most recent fusion result.

use log::{debug, info};

use voxatlas_core::{AtlasLayout, ChannelBuffer, Error, Lut, Result, VolumeDims};

use crate::fusion::{self, FusedVolume, FusionConfig, FusionEntry};

/// Owns every channel of a volume and the last fused output.
#[derive(Debug, Clone)]
pub struct ChannelDataStore {
    layout: AtlasLayout,
    channels: Vec<ChannelBuffer>,
    fused: Option<FusedVolume>,
}

impl ChannelDataStore {
    /// Creates one empty channel per name.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLayout`] if the layout is inconsistent.
    pub fn new<S: AsRef<str>>(layout: AtlasLayout, names: &[S]) -> Result<Self> {
        layout.validate()?;
        let dims = layout.volume_dims();
        Ok(Self {
            layout,
            channels: names
                .iter()
                .map(|name| ChannelBuffer::new(name.as_ref(), dims))
                .collect(),
            fused: None,
        })
    }

    /// Atlas layout shared by all channels.
    #[must_use]
    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    /// Volume dimensions shared by all channels.
    #[must_use]
    pub fn dims(&self) -> VolumeDims {
        self.layout.volume_dims()
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if the store has no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// All channels in index order.
    #[must_use]
    pub fn channels(&self) -> &[ChannelBuffer] {
        &self.channels
    }

    /// One channel.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn channel(&self, index: usize) -> Result<&ChannelBuffer> {
        self.channels
            .get(index)
            .ok_or(Error::ChannelIndexOutOfRange {
                index,
                count: self.channels.len(),
            })
    }

    /// One channel, mutably.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn channel_mut(&mut self, index: usize) -> Result<&mut ChannelBuffer> {
        let count = self.channels.len();
        self.channels
            .get_mut(index)
            .ok_or(Error::ChannelIndexOutOfRange { index, count })
    }

    /// Unpacks an atlas plane into channel `index`.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] or [`Error::DimensionMismatch`].
    pub fn set_channel_data_from_atlas(
        &mut self,
        index: usize,
        data: Vec<u8>,
        width: usize,
        height: usize,
    ) -> Result<()> {
        let layout = self.layout;
        self.channel_mut(index)?
            .set_from_atlas(data, width, height, &layout)
    }

    /// Stores a dense volume into channel `index`.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] or [`Error::DimensionMismatch`].
    pub fn set_channel_data_from_volume(&mut self, index: usize, data: Vec<u8>) -> Result<()> {
        self.channel_mut(index)?.set_from_volume(data)
    }

    /// Returns true once every channel holds data. A store without channels
    /// is never loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        !self.channels.is_empty() && self.channels.iter().all(ChannelBuffer::is_loaded)
    }

    /// Number of channels holding data.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_loaded()).count()
    }

    /// Adds an unloaded channel and returns its index. The previous fusion
    /// result no longer covers every channel and is dropped.
    pub fn append_empty_channel(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        debug!("appending empty channel '{name}'");
        self.channels.push(ChannelBuffer::new(name, self.dims()));
        self.fused = None;
        self.channels.len() - 1
    }

    /// Fuses the channels and keeps the result.
    ///
    /// # Errors
    /// See [`fusion::fuse`].
    pub fn fuse(&mut self, entries: &[FusionEntry], config: &FusionConfig) -> Result<&FusedVolume> {
        let fused = fusion::fuse(entries, config, &self.channels)?;
        Ok(self.fused.insert(fused))
    }

    /// Most recent fusion result. Data writes and appends drop it; callers
    /// that change LUTs or palettes through [`Self::channel_mut`] drop it with
    /// [`Self::invalidate_fused`].
    #[must_use]
    pub fn fused(&self) -> Option<&FusedVolume> {
        self.fused.as_ref()
    }

    /// Drops the stored fusion result.
    pub fn invalidate_fused(&mut self) {
        self.fused = None;
    }

    /// Active LUT of every channel.
    #[must_use]
    pub fn luts(&self) -> Vec<Lut> {
        self.channels.iter().map(|c| *c.lut()).collect()
    }

    /// Swaps in a full set of channel buffers and returns the previous set.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the count or dimensions differ.
    pub fn replace_channels(&mut self, channels: Vec<ChannelBuffer>) -> Result<Vec<ChannelBuffer>> {
        self.check_compatible(&channels)?;
        self.fused = None;
        info!("replaced {} channel buffers", channels.len());
        Ok(std::mem::replace(&mut self.channels, channels))
    }

    /// Checks that `channels` could replace the current set.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the count or dimensions differ.
    pub fn check_compatible(&self, channels: &[ChannelBuffer]) -> Result<()> {
        if channels.len() != self.channels.len() {
            return Err(Error::DimensionMismatch {
                what: "channel count",
                expected: self.channels.len(),
                actual: channels.len(),
            });
        }
        let dims = self.dims();
        if let Some(bad) = channels.iter().find(|c| c.dims() != dims) {
            return Err(Error::DimensionMismatch {
                what: "channel dimensions",
                expected: dims.voxel_count(),
                actual: bad.dims().voxel_count(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ChannelDataStore {
        let layout = AtlasLayout::new(2, 2, 2, 1, 2).unwrap();
        ChannelDataStore::new(layout, &["a", "b"]).unwrap()
    }

    #[test]
    fn test_loaded_after_every_channel() {
        let mut store = store();
        assert!(!store.is_loaded());
        store.set_channel_data_from_volume(0, vec![1; 8]).unwrap();
        assert!(!store.is_loaded());
        assert_eq!(store.loaded_count(), 1);
        store.set_channel_data_from_atlas(1, vec![2; 8], 4, 2).unwrap();
        assert!(store.is_loaded());
    }

    #[test]
    fn test_out_of_range_channel() {
        let mut store = store();
        assert_eq!(
            store.set_channel_data_from_volume(2, vec![0; 8]),
            Err(Error::ChannelIndexOutOfRange { index: 2, count: 2 })
        );
    }

    #[test]
    fn test_append_drops_fused_and_unloads() {
        let mut store = store();
        store.set_channel_data_from_volume(0, vec![1; 8]).unwrap();
        store.set_channel_data_from_volume(1, vec![1; 8]).unwrap();
        store.fuse(&[], &FusionConfig::default()).unwrap();
        assert!(store.fused().is_some());

        assert_eq!(store.append_empty_channel("c"), 2);
        assert!(store.fused().is_none());
        assert!(!store.is_loaded());
        assert_eq!(store.channel(2).unwrap().dims(), store.dims());
    }

    #[test]
    fn test_replace_channels_checks_count() {
        let mut store = store();
        let err = store.replace_channels(vec![ChannelBuffer::new("x", store.dims())]);
        assert!(matches!(err, Err(Error::DimensionMismatch { .. })));
    }
}
