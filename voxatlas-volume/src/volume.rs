//! Top-level volume model.
//!
//! A [`Volume`] owns the channel store plus everything a viewer needs to know
//! about the channels: names, colors, materials, visibility and the fusion
//! setup. Loaders write channel data into it; renderers subscribe to its
//! events and pull the fused buffer and LUTs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;

use log::{info, warn};

use voxatlas_core::color::is_black;
use voxatlas_core::{
    default_channel_color, ChannelBuffer, ColorPalette, Error, Histogram, ImageInfo, Lut,
    LutStrategy, Result, Rgb, VolumeDims,
};

use crate::events::{EventBus, VolumeEvent};
use crate::fusion::{FusedVolume, FusionConfig, FusionEntry, FusionMode, MaskSettings};
use crate::settings::ViewSettings;
use crate::store::ChannelDataStore;

static NEXT_VOLUME_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Volume`], used to reject stale writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeId(u64);

impl VolumeId {
    fn next() -> Self {
        Self(NEXT_VOLUME_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "volume#{}", self.0)
    }
}

/// Default glossiness for new channels.
pub const DEFAULT_GLOSSINESS: f32 = 0.0;

/// Default specular color for new channels.
pub const DEFAULT_SPECULAR: Rgb = [0, 0, 0];

/// Default emissive color for new channels.
pub const DEFAULT_EMISSIVE: Rgb = [0, 0, 0];

/// Display metadata of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMeta {
    /// Channel name.
    pub name: String,
    /// Color assigned at construction.
    pub default_color: Rgb,
    /// Current diffuse color, used by fusion.
    pub color: Rgb,
    /// Specular material color.
    pub specular: Rgb,
    /// Emissive material color.
    pub emissive: Rgb,
    /// Material glossiness.
    pub glossiness: f32,
    /// Whether the channel contributes to fusion.
    pub enabled: bool,
}

impl ChannelMeta {
    /// Metadata for a new channel. A black color starts disabled.
    #[must_use]
    pub fn new(name: impl Into<String>, color: Rgb) -> Self {
        Self {
            name: name.into(),
            default_color: color,
            color,
            specular: DEFAULT_SPECULAR,
            emissive: DEFAULT_EMISSIVE,
            glossiness: DEFAULT_GLOSSINESS,
            enabled: !is_black(color),
        }
    }
}

/// A multichannel volume and its display state.
#[derive(Debug)]
pub struct Volume {
    id: VolumeId,
    info: ImageInfo,
    pixel_size: [f64; 3],
    meta: Vec<ChannelMeta>,
    store: ChannelDataStore,
    fusion: FusionConfig,
    events: EventBus,
    fully_loaded_sent: bool,
}

impl Volume {
    /// Creates an unloaded volume with one empty channel per `info.channels`.
    ///
    /// Channel colors come from `info.channel_colors` or the default palette.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLayout`] or [`Error::ConfigError`] if `info` is
    /// inconsistent.
    pub fn new(info: ImageInfo) -> Result<Self> {
        info.validate()?;
        let store = ChannelDataStore::new(info.layout(), &info.channel_names)?;
        let meta = info
            .channel_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let color = info
                    .channel_colors
                    .as_ref()
                    .and_then(|colors| colors.get(i).copied())
                    .unwrap_or_else(|| default_channel_color(i));
                ChannelMeta::new(name.clone(), color)
            })
            .collect();
        let volume = Self {
            id: VolumeId::next(),
            pixel_size: info.pixel_size(),
            info,
            meta,
            store,
            fusion: FusionConfig::default(),
            events: EventBus::default(),
            fully_loaded_sent: false,
        };
        info!(
            "created {} '{}': {} channels, {:?}",
            volume.id,
            volume.info.name,
            volume.num_channels(),
            volume.dims()
        );
        Ok(volume)
    }

    /// Identity used by loaders to target this volume.
    #[must_use]
    pub fn id(&self) -> VolumeId {
        self.id
    }

    /// Image description this volume was built from.
    #[must_use]
    pub fn image_info(&self) -> &ImageInfo {
        &self.info
    }

    /// Voxel dimensions of every channel.
    #[must_use]
    pub fn dims(&self) -> VolumeDims {
        self.store.dims()
    }

    /// Number of channels.
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.meta.len()
    }

    /// Channel names in index order.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.meta.iter().map(|m| m.name.as_str())
    }

    /// Index of the first channel called `name`.
    #[must_use]
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.meta.iter().position(|m| m.name == name)
    }

    /// Display metadata of every channel.
    #[must_use]
    pub fn channel_meta(&self) -> &[ChannelMeta] {
        &self.meta
    }

    fn meta_mut(&mut self, index: usize) -> Result<&mut ChannelMeta> {
        let count = self.meta.len();
        self.meta
            .get_mut(index)
            .ok_or(Error::ChannelIndexOutOfRange { index, count })
    }

    /// Channel store.
    #[must_use]
    pub fn store(&self) -> &ChannelDataStore {
        &self.store
    }

    /// Registers a receiver for load events.
    pub fn subscribe(&mut self) -> Receiver<VolumeEvent> {
        self.events.subscribe()
    }

    /// Unpacks an atlas plane into channel `index`.
    ///
    /// A rejected buffer leaves the channel unloaded and emits
    /// [`VolumeEvent::ChannelFailed`]; other channels are unaffected.
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
        Error::check_channel(index, self.num_channels())?;
        let result = self
            .store
            .set_channel_data_from_atlas(index, data, width, height);
        self.after_channel_write(index, result)
    }

    /// Stores a dense volume into channel `index`.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] or [`Error::DimensionMismatch`].
    pub fn set_channel_data_from_volume(&mut self, index: usize, data: Vec<u8>) -> Result<()> {
        Error::check_channel(index, self.num_channels())?;
        let result = self.store.set_channel_data_from_volume(index, data);
        self.after_channel_write(index, result)
    }

    /// Reports a load failure that happened before data reached the volume,
    /// e.g. an unreadable file.
    pub fn mark_channel_failed(&mut self, index: usize, error: Error) {
        warn!("{}: channel {index} failed to load: {error}", self.id);
        self.events.emit(&VolumeEvent::ChannelFailed { index, error });
    }

    fn after_channel_write(&mut self, index: usize, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.store.invalidate_fused();
                self.events.emit(&VolumeEvent::ChannelReady(index));
                self.check_fully_loaded();
                Ok(())
            }
            Err(error) => {
                self.mark_channel_failed(index, error.clone());
                Err(error)
            }
        }
    }

    fn check_fully_loaded(&mut self) {
        if self.store.is_loaded() {
            if !self.fully_loaded_sent {
                self.fully_loaded_sent = true;
                info!("{}: all {} channels loaded", self.id, self.num_channels());
                self.events.emit(&VolumeEvent::FullyLoaded);
            }
        } else {
            self.fully_loaded_sent = false;
        }
    }

    /// Returns true iff every channel is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.store.is_loaded()
    }

    /// Returns true if channel `index` holds data.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn is_channel_loaded(&self, index: usize) -> Result<bool> {
        Ok(self.store.channel(index)?.is_loaded())
    }

    /// Includes or excludes a channel from fusion. Drops the fused result
    /// without re-fusing.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn set_volume_channel_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        self.meta_mut(index)?.enabled = enabled;
        self.store.invalidate_fused();
        Ok(())
    }

    /// Returns whether a channel contributes to fusion.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn is_volume_channel_enabled(&self, index: usize) -> Result<bool> {
        Error::check_channel(index, self.num_channels())?;
        Ok(self.meta[index].enabled)
    }

    /// Changes a channel's diffuse color. Visibility is unchanged, so an
    /// enabled channel set to black still counts toward the average.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn update_channel_color(&mut self, index: usize, color: Rgb) -> Result<()> {
        self.meta_mut(index)?.color = color;
        self.store.invalidate_fused();
        Ok(())
    }

    /// Sets a channel's material.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn set_channel_material(
        &mut self,
        index: usize,
        specular: Rgb,
        emissive: Rgb,
        glossiness: f32,
    ) -> Result<()> {
        let meta = self.meta_mut(index)?;
        meta.specular = specular;
        meta.emissive = emissive;
        meta.glossiness = glossiness;
        Ok(())
    }

    /// Adds an empty channel and returns its index.
    ///
    /// Name and color default to `channel_<index>` and the palette color for
    /// the new index. The new channel is enabled whatever its color. The volume
    /// is no longer loaded until the new channel receives data.
    pub fn append_empty_channel(&mut self, name: Option<&str>, color: Option<Rgb>) -> usize {
        let index = self.meta.len();
        let name = name.map_or_else(|| format!("channel_{index}"), str::to_string);
        let color = color.unwrap_or_else(|| default_channel_color(index));

        let stored = self.store.append_empty_channel(name.clone());
        debug_assert_eq!(stored, index);
        self.info.channels += 1;
        self.info.channel_names.push(name.clone());
        if let Some(colors) = &mut self.info.channel_colors {
            colors.push(color);
        }
        // An explicit color is a visibility choice, even when black.
        self.meta.push(ChannelMeta {
            enabled: true,
            ..ChannelMeta::new(name, color)
        });
        self.fully_loaded_sent = false;
        index
    }

    /// Active LUT of channel `index`.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn lut(&self, index: usize) -> Result<&Lut> {
        Ok(self.store.channel(index)?.lut())
    }

    /// Replaces the LUT of channel `index`.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn set_lut(&mut self, index: usize, lut: Lut) -> Result<()> {
        self.store.channel_mut(index)?.set_lut(lut);
        self.store.invalidate_fused();
        Ok(())
    }

    /// Generates and installs a LUT for channel `index`.
    ///
    /// Before data arrives this yields the identity LUT.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn apply_lut(&mut self, index: usize, strategy: &LutStrategy) -> Result<Lut> {
        let lut = self.store.channel_mut(index)?.apply_lut_strategy(strategy);
        self.store.invalidate_fused();
        Ok(lut)
    }

    /// Histogram of channel `index`, rebuilt if its data changed.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn histogram(&mut self, index: usize) -> Result<&Histogram> {
        Ok(self.store.channel_mut(index)?.histogram())
    }

    /// Generates the label palette for channel `index` and sets its blend.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn colorize_labels(&mut self, index: usize, alpha: f32) -> Result<ColorPalette> {
        let channel = self.store.channel_mut(index)?;
        let palette = channel.apply_label_colors();
        channel.set_color_palette_alpha(alpha);
        self.store.invalidate_fused();
        Ok(palette)
    }

    /// Sets or clears the label palette of channel `index`.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn set_color_palette(&mut self, index: usize, palette: Option<ColorPalette>) -> Result<()> {
        self.store.channel_mut(index)?.set_color_palette(palette);
        self.store.invalidate_fused();
        Ok(())
    }

    /// Sets the label palette blend of channel `index`.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn set_color_palette_alpha(&mut self, index: usize, alpha: f32) -> Result<()> {
        self.store.channel_mut(index)?.set_color_palette_alpha(alpha);
        self.store.invalidate_fused();
        Ok(())
    }

    /// Current fusion configuration.
    #[must_use]
    pub fn fusion_config(&self) -> &FusionConfig {
        &self.fusion
    }

    /// Sets the fusion combine rule.
    pub fn set_fusion_mode(&mut self, mode: FusionMode) {
        self.fusion.mode = mode;
        self.store.invalidate_fused();
    }

    /// Designates a mask channel, keeping the current mask alpha (1.0 if none).
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] for a missing index.
    pub fn set_channel_as_mask(&mut self, index: usize) -> Result<()> {
        Error::check_channel(index, self.num_channels())?;
        let alpha = self.fusion.mask.map_or(1.0, |m| m.alpha);
        self.fusion.mask = Some(MaskSettings {
            channel: index,
            alpha,
        });
        self.store.invalidate_fused();
        Ok(())
    }

    /// Removes the mask channel.
    pub fn clear_mask(&mut self) {
        self.fusion.mask = None;
        self.store.invalidate_fused();
    }

    /// Sets the mask blend factor, clamped to `[0, 1]`. Has no effect without
    /// a mask channel.
    pub fn set_mask_alpha(&mut self, alpha: f32) {
        if let Some(mask) = &mut self.fusion.mask {
            mask.alpha = alpha.clamp(0.0, 1.0);
            self.store.invalidate_fused();
        }
    }

    /// Fusion entries built from the current channel metadata.
    #[must_use]
    pub fn fusion_entries(&self) -> Vec<FusionEntry> {
        self.meta
            .iter()
            .enumerate()
            .map(|(channel, meta)| FusionEntry {
                channel,
                color: meta.color,
                enabled: meta.enabled,
            })
            .collect()
    }

    /// Recombines all enabled channels and keeps the result.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] if the mask channel is missing.
    pub fn fuse(&mut self) -> Result<&FusedVolume> {
        let entries = self.fusion_entries();
        let fused = self.store.fuse(&entries, &self.fusion)?;
        info!(
            "{}: fused {} channels ({})",
            self.id,
            fused.contributing_channels(),
            self.fusion.mode
        );
        Ok(fused)
    }

    /// Most recent fusion result. It is dropped whenever channel data or any
    /// input to fusion (LUTs, palettes, colors, visibility, mode, mask)
    /// changes, so a returned buffer always matches the current state.
    #[must_use]
    pub fn fused(&self) -> Option<&FusedVolume> {
        self.store.fused()
    }

    /// Active LUT of every channel, for per-channel renderer lookups.
    #[must_use]
    pub fn channel_luts(&self) -> Vec<Lut> {
        self.store.luts()
    }

    /// Reads one voxel of channel `index`.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] or [`Error::OutOfBounds`].
    pub fn intensity(&self, index: usize, x: usize, y: usize, z: usize) -> Result<u8> {
        self.store.channel(index)?.intensity(x, y, z)
    }

    /// Physical voxel size.
    #[must_use]
    pub fn voxel_size(&self) -> [f64; 3] {
        self.pixel_size
    }

    /// Updates the physical voxel size. Non-positive or non-finite components
    /// are ignored.
    pub fn set_voxel_size(&mut self, size: [f64; 3]) {
        for (current, new) in self.pixel_size.iter_mut().zip(size) {
            if new.is_finite() && new > 0.0 {
                *current = new;
            }
        }
    }

    /// Physical extent scaled so the longest axis in voxels maps to 1, with
    /// each axis stretched by its voxel size relative to the smallest one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn normalized_extent(&self) -> [f64; 3] {
        let voxels = [self.info.width, self.info.height, self.info.tiles].map(|v| v as f64);
        let longest = voxels.iter().copied().fold(0.0, f64::max);
        let finest = self.pixel_size.iter().copied().fold(f64::INFINITY, f64::min);
        if longest <= 0.0 {
            return [0.0; 3];
        }
        let mut extent = [0.0; 3];
        for ((e, v), p) in extent.iter_mut().zip(voxels).zip(self.pixel_size) {
            *e = p / finest * v / longest;
        }
        extent
    }

    /// Applies display settings. Entries past the channel count are an error
    /// and leave the volume untouched.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndexOutOfRange`] if settings name a missing
    /// channel or mask.
    pub fn apply_settings(&mut self, settings: &ViewSettings) -> Result<()> {
        if settings.channels.len() > self.num_channels() {
            return Err(Error::ChannelIndexOutOfRange {
                index: settings.channels.len() - 1,
                count: self.num_channels(),
            });
        }
        if let Some(mask) = settings.mask_channel {
            Error::check_channel(mask, self.num_channels())?;
        }

        for index in 0..self.num_channels() {
            let channel = settings.channels.get(index).cloned().unwrap_or_default();
            let meta = &mut self.meta[index];
            if let Some(enabled) = channel.enabled {
                meta.enabled = enabled;
            }
            if let Some(color) = channel.color {
                meta.color = color;
            }
            if let Some(specular) = channel.specular {
                meta.specular = specular;
            }
            if let Some(emissive) = channel.emissive {
                meta.emissive = emissive;
            }
            if let Some(glossiness) = channel.glossiness {
                meta.glossiness = glossiness;
            }
            if let Some(strategy) = channel.lut.or(settings.default_lut) {
                self.apply_lut(index, &strategy)?;
            }
            if let Some(alpha) = channel.label_alpha {
                let buffer = self.store.channel_mut(index)?;
                if buffer.color_palette().is_none() {
                    buffer.apply_label_colors();
                }
                buffer.set_color_palette_alpha(alpha);
            }
        }
        self.store.invalidate_fused();

        if let Some(mode) = settings.fusion_mode {
            self.set_fusion_mode(mode);
        }
        if let Some(mask) = settings.mask_channel {
            self.set_channel_as_mask(mask)?;
        }
        if let Some(alpha) = settings.mask_alpha {
            self.set_mask_alpha(alpha);
        }
        Ok(())
    }

    /// Swaps the channel buffers for another frame's, returning the previous
    /// ones. Readiness events are emitted for the incoming loaded channels.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the frame does not match this
    /// volume's channel count or dimensions.
    pub(crate) fn swap_channels(
        &mut self,
        channels: Vec<ChannelBuffer>,
    ) -> Result<Vec<ChannelBuffer>> {
        let previous = self.store.replace_channels(channels)?;
        self.fully_loaded_sent = false;
        let ready: Vec<usize> = self
            .store
            .channels()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_loaded())
            .map(|(i, _)| i)
            .collect();
        for index in ready {
            self.events.emit(&VolumeEvent::ChannelReady(index));
        }
        self.check_fully_loaded();
        Ok(previous)
    }
}
