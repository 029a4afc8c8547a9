//! Conversion between tiled atlas planes and dense volumes.
//!
//! Volume data is stored x-fastest, then y, then z. Tile `z` sits at grid row
//! `z / cols` and grid column `z % cols` of the atlas.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::image_info::AtlasLayout;

/// A single-channel 2D atlas plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasImage {
    /// Row-major pixel data, `width * height` bytes.
    pub data: Vec<u8>,
    /// Plane width in pixels.
    pub width: usize,
    /// Plane height in pixels.
    pub height: usize,
}

impl AtlasImage {
    /// Wraps atlas bytes, checking the length against `width * height`.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the length does not match.
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::DimensionMismatch {
                what: "atlas",
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }
}

/// Checks that an atlas of `width × height` matches `layout`.
fn check_atlas_size(layout: &AtlasLayout, width: usize, height: usize) -> Result<()> {
    layout.validate()?;
    if width != layout.atlas_width || height != layout.atlas_height {
        return Err(Error::DimensionMismatch {
            what: "atlas size",
            expected: layout.atlas_len(),
            actual: width * height,
        });
    }
    Ok(())
}

/// Reindexes an atlas plane into a dense volume.
///
/// Only the first `layout.tiles` grid cells are read.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if the atlas does not match the layout.
pub fn unpack(atlas: &AtlasImage, layout: &AtlasLayout) -> Result<Vec<u8>> {
    check_atlas_size(layout, atlas.width, atlas.height)?;
    if atlas.data.len() != layout.atlas_len() {
        return Err(Error::DimensionMismatch {
            what: "atlas",
            expected: layout.atlas_len(),
            actual: atlas.data.len(),
        });
    }

    let dims = layout.volume_dims();
    let mut volume = vec![0u8; dims.voxel_count()];
    let tw = layout.tile_width;

    volume
        .par_chunks_mut(dims.slice_len())
        .enumerate()
        .for_each(|(z, slice)| {
            let (ox, oy) = layout.tile_origin(z);
            for (y, row) in slice.chunks_exact_mut(tw).enumerate() {
                let start = (oy + y) * layout.atlas_width + ox;
                row.copy_from_slice(&atlas.data[start..start + tw]);
            }
        });

    Ok(volume)
}

/// Tiles a dense volume back into an atlas plane; the inverse of [`unpack`].
///
/// Grid cells beyond `layout.tiles` are zero-filled.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if the volume length does not match the layout.
pub fn pack(volume: &[u8], layout: &AtlasLayout) -> Result<AtlasImage> {
    layout.validate()?;
    let dims = layout.volume_dims();
    if volume.len() != dims.voxel_count() {
        return Err(Error::DimensionMismatch {
            what: "volume",
            expected: dims.voxel_count(),
            actual: volume.len(),
        });
    }

    let mut data = vec![0u8; layout.atlas_len()];
    let tw = layout.tile_width;
    let band_len = layout.atlas_width * layout.tile_height;

    // Each band of tile rows is written independently.
    data.par_chunks_mut(band_len)
        .enumerate()
        .for_each(|(tile_row, band)| {
            for tile_col in 0..layout.cols {
                let z = tile_row * layout.cols + tile_col;
                if z >= layout.tiles {
                    break;
                }
                let slice = &volume[z * dims.slice_len()..(z + 1) * dims.slice_len()];
                for (y, src) in slice.chunks_exact(tw).enumerate() {
                    let start = y * layout.atlas_width + tile_col * tw;
                    band[start..start + tw].copy_from_slice(src);
                }
            }
        });

    AtlasImage::new(data, layout.atlas_width, layout.atlas_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tile_layout() -> AtlasLayout {
        AtlasLayout::new(4, 4, 2, 1, 2).unwrap()
    }

    #[test]
    fn test_unpack_two_tiles() {
        let layout = two_tile_layout();
        let mut data = vec![0u8; 32];
        for y in 0..4 {
            for x in 0..8 {
                data[y * 8 + x] = if x < 4 { 10 } else { 200 };
            }
        }
        let atlas = AtlasImage::new(data, 8, 4).unwrap();
        let volume = unpack(&atlas, &layout).unwrap();
        assert_eq!(volume.len(), 32);
        assert!(volume[..16].iter().all(|&v| v == 10));
        assert!(volume[16..].iter().all(|&v| v == 200));
    }

    #[test]
    fn test_unpack_rejects_wrong_size() {
        let layout = two_tile_layout();
        let atlas = AtlasImage::new(vec![0u8; 36], 9, 4).unwrap();
        assert!(matches!(
            unpack(&atlas, &layout),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(AtlasImage::new(vec![0u8; 31], 8, 4).is_err());
    }

    #[test]
    fn test_partial_grid_ignores_trailing_cell() {
        // 3 tiles in a 2x2 grid; the last cell is garbage and must not be read.
        let layout = AtlasLayout::new(2, 2, 3, 2, 2).unwrap();
        let mut data = vec![0u8; 16];
        for (i, v) in data.iter_mut().enumerate() {
            let (x, y) = (i % 4, i / 4);
            let z = (y / 2) * 2 + x / 2;
            *v = if z == 3 { 99 } else { u8::try_from(z + 1).unwrap() };
        }
        let volume = unpack(&AtlasImage::new(data, 4, 4).unwrap(), &layout).unwrap();
        assert_eq!(volume.len(), 12);
        assert!(!volume.contains(&99));
        assert_eq!(&volume[8..12], &[3, 3, 3, 3]);

        let repacked = pack(&volume, &layout).unwrap();
        assert_eq!(repacked.data[2 * 4 + 2], 0);
    }
}
