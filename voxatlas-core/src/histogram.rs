//! Intensity histograms and LUT generation.
//!
//! Every generator is a pure function of the bin counts. Generators that
//! depend on the data return the identity LUT when the histogram is empty so
//! that contrast controls can be wired before any channel data arrives.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use rayon::prelude::*;

use crate::color::hsv_to_rgb;
use crate::error::{Error, Result};
use crate::lut::{AutoContrastConfig, ColorPalette, Lut, LutStrategy, LUT_SIZE};

/// Voxels per work unit when counting bins in parallel.
const BUILD_CHUNK: usize = 1 << 16;

/// Fraction of non-background voxels clipped from each tail by best fit.
const BEST_FIT_TAIL: f64 = 0.1;

/// Hue step between consecutive label values (golden ratio conjugate).
const LABEL_HUE_STEP: f32 = 0.618_034;

/// Intensity distribution of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    bins: [u32; LUT_SIZE],
    data_min: u8,
    data_max: u8,
    total: u64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::empty()
    }
}

impl Histogram {
    /// A histogram with no samples.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            bins: [0; LUT_SIZE],
            data_min: 0,
            data_max: 0,
            total: 0,
        }
    }

    /// Counts every voxel of `data` in a single pass.
    #[must_use]
    pub fn build(data: &[u8]) -> Self {
        let counts = data
            .par_chunks(BUILD_CHUNK)
            .fold(
                || [0u64; LUT_SIZE],
                |mut acc, chunk| {
                    for &v in chunk {
                        acc[usize::from(v)] += 1;
                    }
                    acc
                },
            )
            .reduce(
                || [0u64; LUT_SIZE],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b.iter()) {
                        *x += y;
                    }
                    a
                },
            );

        let mut bins = [0u32; LUT_SIZE];
        for (bin, &count) in bins.iter_mut().zip(counts.iter()) {
            *bin = u32::try_from(count).unwrap_or(u32::MAX);
        }

        let data_min = counts.iter().position(|&c| c > 0).unwrap_or(0);
        let data_max = counts.iter().rposition(|&c| c > 0).unwrap_or(0);

        Self {
            bins,
            data_min: data_min as u8,
            data_max: data_max as u8,
            total: data.len() as u64,
        }
    }

    /// Bin counts indexed by intensity.
    #[inline]
    #[must_use]
    pub fn bins(&self) -> &[u32; LUT_SIZE] {
        &self.bins
    }

    /// Count of voxels with intensity `value`.
    #[inline]
    #[must_use]
    pub fn bin(&self, value: u8) -> u32 {
        self.bins[usize::from(value)]
    }

    /// Lowest intensity present.
    #[inline]
    #[must_use]
    pub fn data_min(&self) -> u8 {
        self.data_min
    }

    /// Highest intensity present.
    #[inline]
    #[must_use]
    pub fn data_max(&self) -> u8 {
        self.data_max
    }

    /// Total voxel count.
    #[inline]
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Voxels with non-zero intensity.
    #[inline]
    #[must_use]
    pub fn non_background_count(&self) -> u64 {
        self.total.saturating_sub(u64::from(self.bins[0]))
    }

    /// Returns true if no voxels were counted.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Intensity at which the cumulative count of non-background voxels first
    /// reaches `fraction` of their total.
    ///
    /// # Errors
    /// Returns [`Error::EmptyHistogram`] if there are no non-background voxels.
    pub fn percentile_value(&self, fraction: f32) -> Result<u8> {
        let count = self.non_background_count();
        if count == 0 {
            return Err(Error::EmptyHistogram);
        }
        let target = f64::from(fraction.clamp(0.0, 1.0)) * count as f64;
        let mut cumulative = 0u64;
        for value in 1..LUT_SIZE {
            cumulative += u64::from(self.bins[value]);
            if cumulative > 0 && cumulative as f64 >= target {
                return Ok(value as u8);
            }
        }
        Ok(self.data_max)
    }

    /// Manual window/level ramp; independent of the data.
    #[must_use]
    pub fn lut_window_level(&self, window: f32, level: f32) -> Lut {
        Lut::window_level(window, level)
    }

    /// Linear stretch of `[data_min, data_max]` onto `[0, 255]`.
    ///
    /// A single-valued channel has nothing to stretch and gets the identity.
    #[must_use]
    pub fn lut_auto(&self) -> Lut {
        if self.is_empty() || self.data_min == self.data_max {
            return Lut::identity();
        }
        Lut::ramp(f32::from(self.data_min), f32::from(self.data_max))
    }

    /// Auto contrast that skips background-dominated bins.
    ///
    /// Bins holding more than `limit_fraction` of all voxels are ignored, then
    /// the stretch runs between the outermost bins whose count exceeds
    /// `total / threshold_divisor`. Falls back to [`Self::lut_auto`] when no
    /// bin qualifies.
    #[must_use]
    pub fn lut_auto2(&self, config: &AutoContrastConfig) -> Lut {
        if self.is_empty() {
            return Lut::identity();
        }
        let total = self.total as f64;
        let limit = total * config.limit_fraction;
        let threshold = total / f64::from(config.threshold_divisor.max(1));
        let significant = |value: &usize| {
            let count = f64::from(self.bins[*value]);
            count <= limit && count > threshold
        };

        let lo = (0..LUT_SIZE).find(significant);
        let hi = (0..LUT_SIZE).rev().find(significant);
        match (lo, hi) {
            (Some(lo), Some(hi)) if hi >= lo => Lut::ramp(lo as f32, hi as f32),
            _ => self.lut_auto(),
        }
    }

    /// Linear stretch between the intensities at the `lo` and `hi` cumulative
    /// fractions of non-background voxels.
    #[must_use]
    pub fn lut_percentiles(&self, lo: f32, hi: f32) -> Lut {
        match (self.percentile_value(lo), self.percentile_value(hi)) {
            (Ok(lo), Ok(hi)) => Lut::ramp(f32::from(lo), f32::from(hi)),
            _ => Lut::identity(),
        }
    }

    /// Window and level (fractions of 0..255) covering the central mass of
    /// non-background voxels, with 10% clipped from each tail.
    #[must_use]
    pub fn best_fit_window_level(&self) -> Option<(f32, f32)> {
        let count = self.non_background_count();
        if count == 0 {
            return None;
        }
        let limit = count as f64 * BEST_FIT_TAIL;

        let mut cumulative = 0u64;
        let mut lo = self.data_max;
        for value in 1..LUT_SIZE {
            cumulative += u64::from(self.bins[value]);
            if cumulative as f64 > limit {
                lo = value as u8;
                break;
            }
        }

        cumulative = 0;
        let mut hi = lo;
        for value in (1..LUT_SIZE).rev() {
            cumulative += u64::from(self.bins[value]);
            if cumulative as f64 > limit {
                hi = value as u8;
                break;
            }
        }

        let (lo, hi) = if hi < lo { (hi, lo) } else { (lo, hi) };
        let window = f32::from(hi - lo) / 255.0;
        let level = (f32::from(lo) + f32::from(hi)) / 2.0 / 255.0;
        Some((window, level))
    }

    /// Window/level LUT from [`Self::best_fit_window_level`].
    #[must_use]
    pub fn lut_best_fit(&self) -> Lut {
        match self.best_fit_window_level() {
            Some((window, level)) => Lut::window_level(window, level),
            None => Lut::identity(),
        }
    }

    /// Categorical palette for label channels.
    ///
    /// Every intensity present in the data other than 0 gets an opaque color
    /// whose hue is derived from the intensity itself; absent intensities and
    /// 0 are transparent black.
    #[must_use]
    pub fn lut_label_colors(&self) -> ColorPalette {
        let mut entries = [[0u8; 4]; LUT_SIZE];
        for (value, entry) in entries.iter_mut().enumerate().skip(1) {
            if self.bins[value] == 0 {
                continue;
            }
            let hue = (value as f32 * LABEL_HUE_STEP).fract();
            let saturation = if value % 2 == 0 { 0.85 } else { 0.55 };
            let [r, g, b] = hsv_to_rgb(hue, saturation, 1.0);
            *entry = [r, g, b, 255];
        }
        ColorPalette::from_entries(entries)
    }

    /// Generates a LUT with the given strategy.
    #[must_use]
    pub fn generate(&self, strategy: &LutStrategy) -> Lut {
        match *strategy {
            LutStrategy::WindowLevel { window, level } => self.lut_window_level(window, level),
            LutStrategy::Auto => self.lut_auto(),
            LutStrategy::Auto2 { config } => self.lut_auto2(&config),
            LutStrategy::Percentiles { lo, hi } => self.lut_percentiles(lo, hi),
            LutStrategy::BestFit => self.lut_best_fit(),
        }
    }
}
