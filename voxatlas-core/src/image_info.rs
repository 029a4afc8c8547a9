//! Image dimensions and tile-atlas layout descriptors.
//!
//! An atlas tiles the z-slices of a volume across a `rows × cols` grid of
//! `tile_width × tile_height` cells, filled row by row. Only the first
//! `tiles` cells carry data.

use crate::color::Rgb;
use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dense volume dimensions in voxels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeDims {
    /// X extent (tile width).
    pub x: usize,
    /// Y extent (tile height).
    pub y: usize,
    /// Z extent (tile count).
    pub z: usize,
}

impl VolumeDims {
    /// Creates new volume dimensions.
    #[inline]
    #[must_use]
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Number of voxels in one z-slice.
    #[inline]
    #[must_use]
    pub fn slice_len(&self) -> usize {
        self.x * self.y
    }

    /// Total number of voxels.
    #[inline]
    #[must_use]
    pub fn voxel_count(&self) -> usize {
        self.x * self.y * self.z
    }

    /// Linear index of `(x, y, z)` in x-fastest order, or `None` outside the volume.
    #[inline]
    #[must_use]
    pub fn index(&self, x: usize, y: usize, z: usize) -> Option<usize> {
        if x < self.x && y < self.y && z < self.z {
            Some(x + y * self.x + z * self.slice_len())
        } else {
            None
        }
    }
}

/// Placement of z-slices inside a 2D atlas image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AtlasLayout {
    /// Atlas image width in pixels.
    pub atlas_width: usize,
    /// Atlas image height in pixels.
    pub atlas_height: usize,
    /// Width of one tile.
    pub tile_width: usize,
    /// Height of one tile.
    pub tile_height: usize,
    /// Number of populated tiles (z-slices).
    pub tiles: usize,
    /// Tile grid rows.
    pub rows: usize,
    /// Tile grid columns.
    pub cols: usize,
}

impl AtlasLayout {
    /// Builds a layout for a `rows × cols` grid, deriving the atlas size.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLayout`] if the grid cannot hold `tiles` slices.
    pub fn new(
        tile_width: usize,
        tile_height: usize,
        tiles: usize,
        rows: usize,
        cols: usize,
    ) -> Result<Self> {
        let overflow = || {
            Error::InvalidLayout(format!(
                "{rows}x{cols} grid of {tile_width}x{tile_height} tiles overflows"
            ))
        };
        let layout = Self {
            atlas_width: cols.checked_mul(tile_width).ok_or_else(overflow)?,
            atlas_height: rows.checked_mul(tile_height).ok_or_else(overflow)?,
            tile_width,
            tile_height,
            tiles,
            rows,
            cols,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Chooses a grid for `tiles` slices of `tile_width × tile_height`.
    ///
    /// Starting from a single row, columns are moved into new rows while the
    /// atlas remains wider than it is tall. The last grid that is still at least
    /// as wide as tall is kept.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLayout`] if any dimension is zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(tile_width: usize, tile_height: usize, tiles: usize) -> Result<Self> {
        if tile_width == 0 || tile_height == 0 || tiles == 0 {
            return Err(Error::InvalidLayout(format!(
                "cannot fit {tiles} tiles of {tile_width}x{tile_height}"
            )));
        }

        let aspect = |cols: usize, rows: usize| {
            (cols as f64 * tile_width as f64) / (rows as f64 * tile_height as f64)
        };

        let (mut rows, mut cols) = (1, tiles);
        let (mut next_rows, mut next_cols) = (1, tiles);
        while aspect(next_cols, next_rows) > 1.0 {
            rows = next_rows;
            cols = next_cols;
            if next_cols == 1 {
                break;
            }
            next_cols -= 1;
            next_rows = tiles.div_ceil(next_cols);
        }

        Self::new(tile_width, tile_height, tiles, rows, cols)
    }

    /// Checks the layout invariants.
    ///
    /// `atlas_width == cols * tile_width`, `atlas_height == rows * tile_height`
    /// and `0 < tiles <= rows * cols`. A partially filled grid is accepted; its
    /// trailing cells are never read. Every buffer size derived from the layout
    /// must fit in `usize`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLayout`] describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(Error::InvalidLayout(format!(
                "tile size {}x{} must be non-zero",
                self.tile_width, self.tile_height
            )));
        }
        if self.tiles == 0 {
            return Err(Error::InvalidLayout("tile count must be non-zero".into()));
        }
        let overflow = |what: &str| {
            Error::InvalidLayout(format!(
                "{what} overflows for {}x{} grid of {}x{} tiles ({} tiles)",
                self.rows, self.cols, self.tile_width, self.tile_height, self.tiles
            ))
        };
        let grid_width = self
            .cols
            .checked_mul(self.tile_width)
            .ok_or_else(|| overflow("atlas width"))?;
        let grid_height = self
            .rows
            .checked_mul(self.tile_height)
            .ok_or_else(|| overflow("atlas height"))?;
        let cells = self
            .rows
            .checked_mul(self.cols)
            .ok_or_else(|| overflow("cell count"))?;
        self.atlas_width
            .checked_mul(self.atlas_height)
            .ok_or_else(|| overflow("atlas size"))?;
        self.tile_width
            .checked_mul(self.tile_height)
            .and_then(|slice| slice.checked_mul(self.tiles))
            .ok_or_else(|| overflow("voxel count"))?;

        if self.atlas_width != grid_width {
            return Err(Error::InvalidLayout(format!(
                "atlas width {} != cols {} * tile width {}",
                self.atlas_width, self.cols, self.tile_width
            )));
        }
        if self.atlas_height != grid_height {
            return Err(Error::InvalidLayout(format!(
                "atlas height {} != rows {} * tile height {}",
                self.atlas_height, self.rows, self.tile_height
            )));
        }
        if self.tiles > cells {
            return Err(Error::InvalidLayout(format!(
                "{} tiles do not fit in a {}x{} grid",
                self.tiles, self.rows, self.cols
            )));
        }
        Ok(())
    }

    /// Number of bytes in one atlas plane.
    #[inline]
    #[must_use]
    pub fn atlas_len(&self) -> usize {
        self.atlas_width * self.atlas_height
    }

    /// Dimensions of the unpacked volume.
    #[inline]
    #[must_use]
    pub fn volume_dims(&self) -> VolumeDims {
        VolumeDims::new(self.tile_width, self.tile_height, self.tiles)
    }

    /// Atlas pixel origin `(x, y)` of tile `z`.
    #[inline]
    #[must_use]
    pub fn tile_origin(&self, z: usize) -> (usize, usize) {
        let tile_row = z / self.cols;
        let tile_col = z % self.cols;
        (tile_col * self.tile_width, tile_row * self.tile_height)
    }

    /// Returns true if some grid cells hold no slice.
    #[inline]
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.tiles < self.rows * self.cols
    }
}

#[cfg(feature = "serde")]
fn default_pixel_size() -> f64 {
    1.0
}

/// Image description supplied by the image-info loader.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageInfo {
    /// Base name of the image.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    /// Schema version string.
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: String,
    /// Width of the original data before downsampling.
    pub width: usize,
    /// Height of the original data before downsampling.
    pub height: usize,
    /// Number of channels.
    pub channels: usize,
    /// One name per channel.
    pub channel_names: Vec<String>,
    /// Tile grid rows.
    pub rows: usize,
    /// Tile grid columns.
    pub cols: usize,
    /// Number of tiles; equals the z extent.
    pub tiles: usize,
    /// Tile width in pixels.
    pub tile_width: usize,
    /// Tile height in pixels.
    pub tile_height: usize,
    /// Atlas width in pixels.
    pub atlas_width: usize,
    /// Atlas height in pixels.
    pub atlas_height: usize,
    /// Physical voxel size along x.
    #[cfg_attr(feature = "serde", serde(default = "default_pixel_size"))]
    pub pixel_size_x: f64,
    /// Physical voxel size along y.
    #[cfg_attr(feature = "serde", serde(default = "default_pixel_size"))]
    pub pixel_size_y: f64,
    /// Physical voxel size along z.
    #[cfg_attr(feature = "serde", serde(default = "default_pixel_size"))]
    pub pixel_size_z: f64,
    /// Optional default color per channel.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub channel_colors: Option<Vec<Rgb>>,
}

impl ImageInfo {
    /// Creates image info for a single atlas grid, naming channels `channel_<i>`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLayout`] if the layout is invalid.
    pub fn from_layout(name: &str, layout: AtlasLayout, channels: usize) -> Result<Self> {
        layout.validate()?;
        Ok(Self {
            name: name.to_string(),
            version: String::new(),
            width: layout.tile_width,
            height: layout.tile_height,
            channels,
            channel_names: (0..channels).map(|i| format!("channel_{i}")).collect(),
            rows: layout.rows,
            cols: layout.cols,
            tiles: layout.tiles,
            tile_width: layout.tile_width,
            tile_height: layout.tile_height,
            atlas_width: layout.atlas_width,
            atlas_height: layout.atlas_height,
            pixel_size_x: 1.0,
            pixel_size_y: 1.0,
            pixel_size_z: 1.0,
            channel_colors: None,
        })
    }

    /// Atlas layout described by this image.
    #[must_use]
    pub fn layout(&self) -> AtlasLayout {
        AtlasLayout {
            atlas_width: self.atlas_width,
            atlas_height: self.atlas_height,
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            tiles: self.tiles,
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Dimensions of each channel's unpacked volume.
    #[must_use]
    pub fn volume_dims(&self) -> VolumeDims {
        VolumeDims::new(self.tile_width, self.tile_height, self.tiles)
    }

    /// Physical voxel size with non-positive or non-finite entries replaced by 1.0.
    #[must_use]
    pub fn pixel_size(&self) -> [f64; 3] {
        let clean = |v: f64| if v.is_finite() && v > 0.0 { v } else { 1.0 };
        [
            clean(self.pixel_size_x),
            clean(self.pixel_size_y),
            clean(self.pixel_size_z),
        ]
    }

    /// Checks layout and per-channel metadata consistency.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLayout`] or [`Error::ConfigError`] on inconsistency.
    pub fn validate(&self) -> Result<()> {
        self.layout().validate()?;
        if self.channel_names.len() != self.channels {
            return Err(Error::ConfigError(format!(
                "{} channel names for {} channels",
                self.channel_names.len(),
                self.channels
            )));
        }
        if let Some(colors) = &self.channel_colors {
            if colors.len() != self.channels {
                return Err(Error::ConfigError(format!(
                    "{} channel colors for {} channels",
                    colors.len(),
                    self.channels
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_dims_index() {
        let dims = VolumeDims::new(4, 3, 2);
        assert_eq!(dims.voxel_count(), 24);
        assert_eq!(dims.index(0, 0, 0), Some(0));
        assert_eq!(dims.index(1, 2, 1), Some(1 + 2 * 4 + 12));
        assert_eq!(dims.index(4, 0, 0), None);
        assert_eq!(dims.index(0, 0, 2), None);
    }

    #[test]
    fn test_layout_validation() {
        assert!(AtlasLayout::new(4, 4, 2, 1, 2).is_ok());
        assert!(AtlasLayout::new(4, 4, 3, 1, 2).is_err());
        assert!(AtlasLayout::new(0, 4, 1, 1, 1).is_err());

        let mut layout = AtlasLayout::new(4, 4, 2, 1, 2).unwrap();
        layout.atlas_width = 9;
        assert!(matches!(layout.validate(), Err(Error::InvalidLayout(_))));
    }

    #[test]
    fn test_oversized_layout_rejected() {
        let big = usize::MAX / 2;
        assert!(matches!(
            AtlasLayout::new(big, 4, 1, 1, 1),
            Err(Error::InvalidLayout(_))
        ));
        assert!(matches!(
            AtlasLayout::new(4, 4, 1, 1, big),
            Err(Error::InvalidLayout(_))
        ));

        let mut layout = AtlasLayout::new(4, 4, 2, 1, 2).unwrap();
        layout.tiles = big;
        layout.rows = big;
        layout.atlas_height = big;
        layout.tile_height = 1;
        assert!(matches!(layout.validate(), Err(Error::InvalidLayout(_))));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_tile_size_overflowing_voxel_count_rejected() {
        let side = 1usize << 32;
        let layout = AtlasLayout {
            atlas_width: side,
            atlas_height: side,
            tile_width: side,
            tile_height: side,
            tiles: 1,
            rows: 1,
            cols: 1,
        };
        assert!(matches!(layout.validate(), Err(Error::InvalidLayout(_))));
        assert!(AtlasLayout::new(side, side, 1, 1, 1).is_err());

        let mut info = ImageInfo::from_layout("img", AtlasLayout::new(4, 4, 1, 1, 1).unwrap(), 1)
            .unwrap();
        info.tile_width = side;
        info.tile_height = side;
        info.atlas_width = side;
        info.atlas_height = side;
        assert!(matches!(info.validate(), Err(Error::InvalidLayout(_))));
    }

    #[test]
    fn test_partial_grid() {
        let layout = AtlasLayout::new(2, 2, 5, 2, 3).unwrap();
        assert!(layout.is_partial());
        assert_eq!(layout.tile_origin(4), (2, 2));
    }

    #[test]
    fn test_fit_square_tiles() {
        // 65 square tiles: widest grid that is still not taller than wide.
        let layout = AtlasLayout::fit(10, 10, 65).unwrap();
        assert!(layout.atlas_width >= layout.atlas_height);
        assert!(layout.rows * layout.cols >= 65);
        assert_eq!((layout.rows, layout.cols), (8, 9));
    }

    #[test]
    fn test_fit_single_tile() {
        let layout = AtlasLayout::fit(600, 600, 1).unwrap();
        assert_eq!((layout.rows, layout.cols), (1, 1));
        assert!(AtlasLayout::fit(0, 10, 3).is_err());
    }

    #[test]
    fn test_pixel_size_defaults() {
        let mut info = ImageInfo::from_layout("img", AtlasLayout::new(4, 4, 2, 1, 2).unwrap(), 1)
            .unwrap();
        info.pixel_size_x = 0.0;
        info.pixel_size_z = 0.29;
        assert_eq!(info.pixel_size(), [1.0, 1.0, 0.29]);
    }

    #[test]
    fn test_info_channel_name_mismatch() {
        let mut info = ImageInfo::from_layout("img", AtlasLayout::new(4, 4, 2, 1, 2).unwrap(), 2)
            .unwrap();
        assert!(info.validate().is_ok());
        info.channel_names.pop();
        assert!(matches!(info.validate(), Err(Error::ConfigError(_))));
    }
}
