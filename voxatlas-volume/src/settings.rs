//! Display settings that can be applied to a volume in one step.
//!
//! These mirror what a viewer persists between sessions: per-channel
//! visibility, color, material and LUT choice plus the fusion setup.

use voxatlas_core::{LutStrategy, Rgb};

use crate::fusion::FusionMode;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings for one channel. Unset fields leave the channel unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChannelSettings {
    /// Include the channel in fusion.
    pub enabled: Option<bool>,
    /// Display color.
    pub color: Option<Rgb>,
    /// Specular material color.
    pub specular: Option<Rgb>,
    /// Emissive material color.
    pub emissive: Option<Rgb>,
    /// Material glossiness.
    pub glossiness: Option<f32>,
    /// LUT to generate from the channel histogram.
    pub lut: Option<LutStrategy>,
    /// Label palette blend; a value installs the palette if none is set.
    pub label_alpha: Option<f32>,
}

impl ChannelSettings {
    /// Creates empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets visibility.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Sets the display color.
    #[must_use]
    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    /// Sets the LUT strategy.
    #[must_use]
    pub fn with_lut(mut self, lut: LutStrategy) -> Self {
        self.lut = Some(lut);
        self
    }

    /// Sets the label palette blend.
    #[must_use]
    pub fn with_label_alpha(mut self, alpha: f32) -> Self {
        self.label_alpha = Some(alpha);
        self
    }
}

/// Settings for a whole volume.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ViewSettings {
    /// Per-channel settings by index. Shorter than the channel list is fine.
    pub channels: Vec<ChannelSettings>,
    /// LUT strategy for channels without their own.
    pub default_lut: Option<LutStrategy>,
    /// Fusion combine rule.
    pub fusion_mode: Option<FusionMode>,
    /// Mask channel index.
    pub mask_channel: Option<usize>,
    /// Mask blend factor.
    pub mask_alpha: Option<f32>,
}

impl ViewSettings {
    /// Creates empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets settings for channel `index`, padding with empty entries.
    #[must_use]
    pub fn with_channel(mut self, index: usize, settings: ChannelSettings) -> Self {
        if self.channels.len() <= index {
            self.channels.resize_with(index + 1, ChannelSettings::default);
        }
        self.channels[index] = settings;
        self
    }

    /// Sets the fallback LUT strategy.
    #[must_use]
    pub fn with_default_lut(mut self, lut: LutStrategy) -> Self {
        self.default_lut = Some(lut);
        self
    }

    /// Sets the fusion mode.
    #[must_use]
    pub fn with_fusion_mode(mut self, mode: FusionMode) -> Self {
        self.fusion_mode = Some(mode);
        self
    }

    /// Sets the mask channel and blend.
    #[must_use]
    pub fn with_mask(mut self, channel: usize, alpha: f32) -> Self {
        self.mask_channel = Some(channel);
        self.mask_alpha = Some(alpha);
        self
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{
            "channels": [
                {"enabled": false},
                {"color": [255, 0, 0], "lut": {"kind": "percentiles", "lo": 0.5, "hi": 0.998}}
            ],
            "fusion_mode": "avg",
            "mask_channel": 1
        }"#;
        let settings: ViewSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.channels[0].enabled, Some(false));
        assert_eq!(settings.channels[1].color, Some([255, 0, 0]));
        assert_eq!(
            settings.channels[1].lut,
            Some(LutStrategy::Percentiles { lo: 0.5, hi: 0.998 })
        );
        assert_eq!(settings.fusion_mode, Some(FusionMode::Average));
        assert_eq!(settings.mask_channel, Some(1));
        assert_eq!(settings.mask_alpha, None);
    }
}
