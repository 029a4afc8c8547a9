//! voxatlas-io: File I/O for voxatlas.
//!
//! This crate reads image-info manifests, packed PNG atlases and
//! memory-mapped raw volumes, loads channels concurrently into a
//! [`voxatlas_volume::Volume`], and writes fused volumes, LUTs and
//! histograms.
//!

pub mod convert;
mod error;
pub mod loader;
pub mod manifest;
pub mod png;
mod reader;
mod writer;

pub use convert::to_u8_min_max;
pub use error::{Error, Result};
pub use loader::{
    load_channels, LoadMessage, LoadPayload, LoadReport, LoadSession, LoadSource, LoaderConfig,
};
pub use manifest::{AtlasImageEntry, ImageManifest};
pub use png::{decode_packed_atlas, encode_packed_atlas, read_packed_atlas, PackedAtlas};
pub use reader::{read_raw_volume, MappedFileReader, SampleFormat};
pub use writer::DataFileWriter;
