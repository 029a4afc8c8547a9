//! Multichannel fusion into a single RGBA volume.
//!
//! Every enabled, loaded channel maps its voxels through its LUT, scales the
//! result by its color, and the per-channel colors are combined voxel-wise by
//! maximum or mean. An optional mask channel then gates the combined color.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use log::debug;
use rayon::prelude::*;

use voxatlas_core::{ChannelBuffer, Error, Lut, Result, Rgb, VolumeDims, LUT_SIZE};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Voxels per rayon work unit.
const MIN_VOXELS_PER_TASK: usize = 4096;

/// Rule for combining channel colors at one voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FusionMode {
    /// Component-wise maximum.
    #[default]
    Max,
    /// Arithmetic mean over the contributing channels.
    #[cfg_attr(feature = "serde", serde(alias = "avg"))]
    Average,
}

impl std::fmt::Display for FusionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FusionMode::Max => write!(f, "max"),
            FusionMode::Average => write!(f, "avg"),
        }
    }
}

/// One channel's participation in a fusion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FusionEntry {
    /// Index into the channel list.
    pub channel: usize,
    /// Display color.
    pub color: Rgb,
    /// Whether the channel contributes. A black enabled channel still counts
    /// toward the average.
    pub enabled: bool,
}

impl FusionEntry {
    /// Creates an enabled entry.
    #[must_use]
    pub fn new(channel: usize, color: Rgb) -> Self {
        Self {
            channel,
            color,
            enabled: true,
        }
    }

    /// Creates a disabled entry.
    #[must_use]
    pub fn disabled(channel: usize, color: Rgb) -> Self {
        Self {
            channel,
            color,
            enabled: false,
        }
    }
}

/// Mask channel selection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MaskSettings {
    /// Channel whose LUT-mapped intensity gates the fused color.
    pub channel: usize,
    /// Blend between unmasked (0) and fully masked (1) output.
    pub alpha: f32,
}

/// Fusion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FusionConfig {
    /// Combine rule.
    pub mode: FusionMode,
    /// Optional mask channel.
    pub mask: Option<MaskSettings>,
}

impl FusionConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the combine rule.
    #[must_use]
    pub fn with_mode(mut self, mode: FusionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the mask channel and blend factor (clamped to `[0, 1]`).
    #[must_use]
    pub fn with_mask(mut self, channel: usize, alpha: f32) -> Self {
        self.mask = Some(MaskSettings {
            channel,
            alpha: alpha.clamp(0.0, 1.0),
        });
        self
    }
}

/// Output of a fusion pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedVolume {
    dims: VolumeDims,
    rgba: Vec<u8>,
    luts: Vec<Lut>,
    contributing: usize,
}

impl FusedVolume {
    /// Volume dimensions.
    #[must_use]
    pub fn dims(&self) -> VolumeDims {
        self.dims
    }

    /// Interleaved RGBA voxels, x-fastest. Alpha is the largest color component.
    #[must_use]
    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Consumes the result, returning the RGBA buffer.
    #[must_use]
    pub fn into_rgba(self) -> Vec<u8> {
        self.rgba
    }

    /// RGBA of one voxel.
    #[must_use]
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> Option<[u8; 4]> {
        let i = self.dims.index(x, y, z)? * 4;
        let px = self.rgba.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Per-channel LUTs, indexed like the channel list.
    #[must_use]
    pub fn luts(&self) -> &[Lut] {
        &self.luts
    }

    /// Number of channels that contributed color.
    #[must_use]
    pub fn contributing_channels(&self) -> usize {
        self.contributing
    }
}

/// Channel color per raw intensity, components in 0..255.
struct ChannelTable<'a> {
    data: &'a [u8],
    colors: [[f32; 3]; LUT_SIZE],
}

impl<'a> ChannelTable<'a> {
    fn new(channel: &'a ChannelBuffer, color: Rgb) -> Self {
        let lut = channel.lut();
        let palette = channel
            .color_palette()
            .filter(|_| channel.color_palette_alpha() > 0.0);
        let alpha = channel.color_palette_alpha();

        let mut colors = [[0f32; 3]; LUT_SIZE];
        for (value, entry) in colors.iter_mut().enumerate() {
            let raw = value as u8;
            let intensity = f32::from(lut.apply(raw)) / 255.0;
            for (e, &c) in entry.iter_mut().zip(color.iter()) {
                *e = intensity * f32::from(c);
            }
            if let Some(palette) = palette {
                let [r, g, b, a] = palette.get(raw);
                let weight = alpha * f32::from(a) / 255.0;
                for (k, p) in [r, g, b].into_iter().enumerate() {
                    entry[k] = entry[k] * (1.0 - weight) + f32::from(p) * weight;
                }
            }
        }
        Self {
            data: channel.volume_data(),
            colors,
        }
    }
}

struct MaskTable<'a> {
    data: &'a [u8],
    factor: [f32; LUT_SIZE],
}

impl<'a> MaskTable<'a> {
    fn new(channel: &'a ChannelBuffer, alpha: f32) -> Self {
        let alpha = alpha.clamp(0.0, 1.0);
        let lut = channel.lut();
        let mut factor = [1f32; LUT_SIZE];
        for (value, f) in factor.iter_mut().enumerate() {
            let m = f32::from(lut.apply(value as u8)) / 255.0;
            *f = 1.0 - alpha + alpha * m;
        }
        Self {
            data: channel.volume_data(),
            factor,
        }
    }
}

fn to_byte(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Combines the enabled channels into one RGBA volume.
///
/// Disabled and not-yet-loaded channels contribute nothing and are excluded
/// from the average. With nothing to combine the output is all zero.
///
/// # Errors
/// Returns [`Error::ChannelIndexOutOfRange`] if an entry or the mask refers to
/// a missing channel, and [`Error::DimensionMismatch`] if channels disagree on
/// their dimensions.
pub fn fuse(
    entries: &[FusionEntry],
    config: &FusionConfig,
    channels: &[ChannelBuffer],
) -> Result<FusedVolume> {
    let dims = channels
        .first()
        .map_or(VolumeDims::new(0, 0, 0), ChannelBuffer::dims);
    for channel in channels {
        if channel.dims() != dims {
            return Err(Error::DimensionMismatch {
                what: "channel dimensions",
                expected: dims.voxel_count(),
                actual: channel.dims().voxel_count(),
            });
        }
    }
    for entry in entries {
        Error::check_channel(entry.channel, channels.len())?;
    }
    if let Some(mask) = &config.mask {
        Error::check_channel(mask.channel, channels.len())?;
    }

    let tables: Vec<ChannelTable<'_>> = entries
        .iter()
        .filter(|entry| entry.enabled && channels[entry.channel].is_loaded())
        .map(|entry| ChannelTable::new(&channels[entry.channel], entry.color))
        .collect();
    let mask = config
        .mask
        .filter(|mask| channels[mask.channel].is_loaded())
        .map(|mask| MaskTable::new(&channels[mask.channel], mask.alpha));

    let voxels = dims.voxel_count();
    let mut rgba = vec![0u8; voxels * 4];

    if !tables.is_empty() {
        let mode = config.mode;
        let count = tables.len() as f32;
        rgba.par_chunks_mut(4)
            .with_min_len(MIN_VOXELS_PER_TASK)
            .enumerate()
            .for_each(|(i, px)| {
                let mut acc = [0f32; 3];
                for table in &tables {
                    let c = &table.colors[usize::from(table.data[i])];
                    for (a, &v) in acc.iter_mut().zip(c) {
                        *a = match mode {
                            FusionMode::Max => a.max(v),
                            FusionMode::Average => *a + v,
                        };
                    }
                }
                if mode == FusionMode::Average {
                    for a in &mut acc {
                        *a /= count;
                    }
                }
                if let Some(mask) = &mask {
                    let f = mask.factor[usize::from(mask.data[i])];
                    for a in &mut acc {
                        *a *= f;
                    }
                }
                let [r, g, b] = acc.map(to_byte);
                px.copy_from_slice(&[r, g, b, r.max(g).max(b)]);
            });
    }

    debug!(
        "fused {} of {} channels ({} mode, mask {:?}) over {} voxels",
        tables.len(),
        channels.len(),
        config.mode,
        config.mask.map(|m| m.channel),
        voxels
    );

    Ok(FusedVolume {
        dims,
        rgba,
        luts: channels.iter().map(|c| *c.lut()).collect(),
        contributing: tables.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_with(values: &[u8]) -> ChannelBuffer {
        let mut channel = ChannelBuffer::new("c", VolumeDims::new(values.len(), 1, 1));
        channel.set_from_volume(values.to_vec()).unwrap();
        channel
    }

    #[test]
    fn test_single_channel_color_scaling() {
        let channels = vec![channel_with(&[0, 255, 51])];
        let fused = fuse(
            &[FusionEntry::new(0, [255, 0, 100])],
            &FusionConfig::default(),
            &channels,
        )
        .unwrap();
        assert_eq!(fused.voxel(0, 0, 0), Some([0, 0, 0, 0]));
        assert_eq!(fused.voxel(1, 0, 0), Some([255, 0, 100, 255]));
        assert_eq!(fused.voxel(2, 0, 0), Some([51, 0, 20, 51]));
        assert_eq!(fused.contributing_channels(), 1);
    }

    #[test]
    fn test_all_disabled_is_zero() {
        let channels = vec![channel_with(&[10, 20]), channel_with(&[30, 40])];
        let entries = [
            FusionEntry::disabled(0, [255, 0, 0]),
            FusionEntry::disabled(1, [0, 255, 0]),
        ];
        let fused = fuse(&entries, &FusionConfig::default(), &channels).unwrap();
        assert!(fused.rgba().iter().all(|&v| v == 0));
        assert_eq!(fused.luts().len(), 2);
    }

    #[test]
    fn test_black_enabled_channel_counts_in_average() {
        let channels = vec![channel_with(&[200]), channel_with(&[200])];
        let entries = [
            FusionEntry::new(0, [255, 255, 255]),
            FusionEntry::new(1, [0, 0, 0]),
        ];
        let config = FusionConfig::new().with_mode(FusionMode::Average);
        let fused = fuse(&entries, &config, &channels).unwrap();
        assert_eq!(fused.voxel(0, 0, 0), Some([100, 100, 100, 100]));
    }

    #[test]
    fn test_out_of_range_entry() {
        let channels = vec![channel_with(&[1])];
        let err = fuse(
            &[FusionEntry::new(3, [1, 1, 1])],
            &FusionConfig::default(),
            &channels,
        );
        assert_eq!(
            err.unwrap_err(),
            Error::ChannelIndexOutOfRange { index: 3, count: 1 }
        );
        let err = fuse(&[], &FusionConfig::new().with_mask(1, 1.0), &channels);
        assert!(matches!(err, Err(Error::ChannelIndexOutOfRange { .. })));
    }

    #[test]
    fn test_unloaded_channel_is_skipped() {
        let channels = vec![
            channel_with(&[255]),
            ChannelBuffer::new("pending", VolumeDims::new(1, 1, 1)),
        ];
        let entries = [
            FusionEntry::new(0, [255, 0, 0]),
            FusionEntry::new(1, [0, 255, 0]),
        ];
        let config = FusionConfig::new().with_mode(FusionMode::Average);
        let fused = fuse(&entries, &config, &channels).unwrap();
        assert_eq!(fused.voxel(0, 0, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_label_palette_blend() {
        let mut channel = channel_with(&[0, 7]);
        channel.apply_label_colors();
        channel.set_color_palette_alpha(1.0);
        let palette_rgb = channel.color_palette().unwrap().rgb(7);
        let fused = fuse(
            &[FusionEntry::new(0, [255, 255, 255])],
            &FusionConfig::default(),
            &[channel],
        )
        .unwrap();
        let [r, g, b, _] = fused.voxel(1, 0, 0).unwrap();
        assert_eq!([r, g, b], palette_rgb);
        assert_eq!(fused.voxel(0, 0, 0), Some([0, 0, 0, 0]));
    }
}
