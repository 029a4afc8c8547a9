//! voxatlas-volume: Multichannel volume model and channel fusion.
//!
//! This crate builds on `voxatlas-core` with the per-volume pieces:
//! the channel data store, fusion into a single RGBA volume, load events,
//! view settings and time-series frame swapping.
//!

pub mod events;
pub mod fusion;
pub mod series;
pub mod settings;
pub mod store;
pub mod volume;

pub use events::VolumeEvent;
pub use fusion::{fuse, FusedVolume, FusionConfig, FusionEntry, FusionMode, MaskSettings};
pub use series::{FrameData, TimeSeries};
pub use settings::{ChannelSettings, ViewSettings};
pub use store::ChannelDataStore;
pub use volume::{ChannelMeta, Volume, VolumeId};

// Re-export the core crate for downstream users.
pub use voxatlas_core;
