//! Lookup tables mapping raw 8-bit intensity to display intensity or color.

use crate::color::Rgb;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of entries in every LUT.
pub const LUT_SIZE: usize = 256;

/// A 256-entry intensity lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lut([u8; LUT_SIZE]);

impl Default for Lut {
    fn default() -> Self {
        Self::identity()
    }
}

impl Lut {
    /// The identity ramp, `lut[i] == i`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn identity() -> Self {
        let mut values = [0u8; LUT_SIZE];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as u8;
        }
        Self(values)
    }

    /// A constant table.
    #[must_use]
    pub fn flat(value: u8) -> Self {
        Self([value; LUT_SIZE])
    }

    /// Wraps raw table values.
    #[must_use]
    pub fn from_values(values: [u8; LUT_SIZE]) -> Self {
        Self(values)
    }

    /// Linear ramp from `lo` to `hi` in intensity units.
    ///
    /// Entries at or above `hi` are 255, entries at or below `lo` are 0, and
    /// entries in between are interpolated. When `hi <= lo` the ramp collapses
    /// to a step at `hi`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn ramp(lo: f32, hi: f32) -> Self {
        let mut values = [0u8; LUT_SIZE];
        for (i, v) in values.iter_mut().enumerate() {
            let x = i as f32;
            *v = if x >= hi {
                255
            } else if x <= lo {
                0
            } else {
                ((x - lo) / (hi - lo) * 255.0).round().clamp(0.0, 255.0) as u8
            };
        }
        Self(values)
    }

    /// Window/level ramp; both arguments are fractions of the 0..255 range.
    ///
    /// `window = 1, level = 0.5` is the identity; `window = 0` is a hard step
    /// at `level * 255`.
    #[must_use]
    pub fn window_level(window: f32, level: f32) -> Self {
        let lo = (level - window / 2.0) * 255.0;
        let hi = (level + window / 2.0) * 255.0;
        Self::ramp(lo, hi)
    }

    /// Looks up one intensity.
    #[inline]
    #[must_use]
    pub fn apply(&self, value: u8) -> u8 {
        self.0[usize::from(value)]
    }

    /// Table values.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[u8; LUT_SIZE] {
        &self.0
    }

    /// Table values as a byte slice, ready for texture upload.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// First and last raw intensities where the table leaves 0 and reaches 255.
    #[must_use]
    pub fn bounds(&self) -> (u8, u8) {
        let lo = self.0.iter().position(|&v| v > 0).unwrap_or(LUT_SIZE - 1);
        let hi = self.0.iter().position(|&v| v == 255).unwrap_or(LUT_SIZE - 1);
        (
            u8::try_from(lo).unwrap_or(u8::MAX),
            u8::try_from(hi).unwrap_or(u8::MAX),
        )
    }
}

/// A 256-entry RGBA palette keyed by raw intensity, used for label channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorPalette([[u8; 4]; LUT_SIZE]);

impl Default for ColorPalette {
    fn default() -> Self {
        Self([[0, 0, 0, 0]; LUT_SIZE])
    }
}

impl ColorPalette {
    /// Wraps raw palette entries.
    #[must_use]
    pub fn from_entries(entries: [[u8; 4]; LUT_SIZE]) -> Self {
        Self(entries)
    }

    /// RGBA entry for a raw intensity.
    #[inline]
    #[must_use]
    pub fn get(&self, value: u8) -> [u8; 4] {
        self.0[usize::from(value)]
    }

    /// RGB part of the entry for a raw intensity.
    #[inline]
    #[must_use]
    pub fn rgb(&self, value: u8) -> Rgb {
        let [r, g, b, _] = self.0[usize::from(value)];
        [r, g, b]
    }

    /// Palette as interleaved RGBA bytes.
    #[must_use]
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.0.iter().flatten().copied().collect()
    }
}

/// Parameters for background-excluding auto contrast.
///
/// A bin is treated as background when it holds more than `limit_fraction` of
/// all voxels. The stretch starts and ends at the first bins, from either end,
/// whose count exceeds `total / threshold_divisor`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AutoContrastConfig {
    /// Divisor of the voxel count giving the minimum significant bin count.
    pub threshold_divisor: u32,
    /// Fraction of the voxel count above which a bin is ignored.
    pub limit_fraction: f64,
}

impl Default for AutoContrastConfig {
    fn default() -> Self {
        Self {
            threshold_divisor: 5000,
            limit_fraction: 0.1,
        }
    }
}

impl AutoContrastConfig {
    /// Sets the threshold divisor (clamped to at least 1).
    #[must_use]
    pub fn with_threshold_divisor(mut self, divisor: u32) -> Self {
        self.threshold_divisor = divisor.max(1);
        self
    }

    /// Sets the background limit fraction.
    #[must_use]
    pub fn with_limit_fraction(mut self, fraction: f64) -> Self {
        self.limit_fraction = fraction;
        self
    }
}

/// LUT generation strategy selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum LutStrategy {
    /// Manual window/level, both in `[0, 1]`.
    WindowLevel { window: f32, level: f32 },
    /// Min/max stretch of the observed data range.
    Auto,
    /// Background-excluding auto contrast.
    Auto2 {
        #[cfg_attr(feature = "serde", serde(default))]
        config: AutoContrastConfig,
    },
    /// Stretch between two cumulative fractions of non-background voxels.
    Percentiles { lo: f32, hi: f32 },
    /// Window/level fitted to the central mass of non-background voxels.
    BestFit,
}

impl Default for LutStrategy {
    fn default() -> Self {
        LutStrategy::WindowLevel {
            window: 1.0,
            level: 0.5,
        }
    }
}

impl std::fmt::Display for LutStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LutStrategy::WindowLevel { window, level } => {
                write!(f, "window/level ({window:.3}, {level:.3})")
            }
            LutStrategy::Auto => write!(f, "auto"),
            LutStrategy::Auto2 { .. } => write!(f, "auto2"),
            LutStrategy::Percentiles { lo, hi } => write!(f, "percentiles ({lo}, {hi})"),
            LutStrategy::BestFit => write!(f, "best fit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let lut = Lut::identity();
        for i in 0..=255u8 {
            assert_eq!(lut.apply(i), i);
        }
        assert_eq!(Lut::default(), lut);
    }

    #[test]
    fn test_window_level_full_range_is_identity() {
        let lut = Lut::window_level(1.0, 0.5);
        for i in 0..=255u8 {
            assert!(lut.apply(i).abs_diff(i) <= 1, "entry {i} = {}", lut.apply(i));
        }
    }

    #[test]
    fn test_window_zero_is_step() {
        let lut = Lut::window_level(0.0, 0.5);
        // level * 255 = 127.5
        assert!(lut.values()[..=127].iter().all(|&v| v == 0));
        assert!(lut.values()[128..].iter().all(|&v| v == 255));

        // level * 255 = 63.75
        let lut = Lut::window_level(0.0, 0.25);
        assert_eq!(lut.apply(63), 0);
        assert_eq!(lut.apply(64), 255);
    }

    #[test]
    fn test_ramp_bounds() {
        let lut = Lut::ramp(50.0, 150.0);
        assert_eq!(lut.apply(50), 0);
        assert_eq!(lut.apply(100), 128);
        assert_eq!(lut.apply(150), 255);
        assert_eq!(lut.bounds(), (51, 150));
    }

    #[test]
    fn test_palette_bytes() {
        let mut entries = [[0u8; 4]; LUT_SIZE];
        entries[3] = [1, 2, 3, 255];
        let palette = ColorPalette::from_entries(entries);
        assert_eq!(palette.rgb(3), [1, 2, 3]);
        assert_eq!(palette.to_rgba_bytes().len(), 1024);
    }
}
