//! voxatlas-core: Core types for multichannel volume data.
//!
//! This crate provides the per-channel building blocks: atlas/volume
//! reindexing, channel buffers, intensity histograms and LUT generation.
//!

pub mod atlas;
pub mod channel;
pub mod color;
pub mod error;
pub mod histogram;
pub mod image_info;
pub mod lut;

pub use atlas::AtlasImage;
pub use channel::ChannelBuffer;
pub use color::{default_channel_color, Rgb};
pub use error::{Error, Result};
pub use histogram::Histogram;
pub use image_info::{AtlasLayout, ImageInfo, VolumeDims};
pub use lut::{AutoContrastConfig, ColorPalette, Lut, LutStrategy, LUT_SIZE};
