#![allow(clippy::cast_possible_truncation)]
use voxatlas_core::atlas::{pack, unpack};
use voxatlas_core::{AtlasImage, AtlasLayout, ChannelBuffer};

// Deterministic per-pixel pattern so misplaced tiles are detectable.
fn patterned_atlas(layout: &AtlasLayout) -> AtlasImage {
    let mut data = vec![0u8; layout.atlas_len()];
    for z in 0..layout.tiles {
        let (ox, oy) = layout.tile_origin(z);
        for y in 0..layout.tile_height {
            for x in 0..layout.tile_width {
                data[(oy + y) * layout.atlas_width + ox + x] = ((x * 3 + y * 5 + z * 11) % 251) as u8;
            }
        }
    }
    AtlasImage::new(data, layout.atlas_width, layout.atlas_height).unwrap()
}

#[test]
fn test_unpack_then_pack_reproduces_atlas() {
    for (tw, th, tiles, rows, cols) in [
        (4, 4, 2, 1, 2),
        (5, 3, 6, 2, 3),
        (7, 2, 5, 2, 3),
        (1, 1, 1, 1, 1),
        (16, 9, 12, 3, 4),
    ] {
        let layout = AtlasLayout::new(tw, th, tiles, rows, cols).unwrap();
        let atlas = patterned_atlas(&layout);
        let volume = unpack(&atlas, &layout).unwrap();
        assert_eq!(volume.len(), tw * th * tiles);

        let repacked = pack(&volume, &layout).unwrap();
        assert_eq!(repacked, atlas, "layout {layout:?}");
    }
}

#[test]
fn test_voxels_match_atlas_pixels() {
    let layout = AtlasLayout::new(5, 3, 6, 2, 3).unwrap();
    let atlas = patterned_atlas(&layout);
    let mut channel = ChannelBuffer::new("c0", layout.volume_dims());
    channel
        .set_from_atlas(atlas.data.clone(), atlas.width, atlas.height, &layout)
        .unwrap();

    for z in 0..layout.tiles {
        let (ox, oy) = layout.tile_origin(z);
        for y in 0..layout.tile_height {
            for x in 0..layout.tile_width {
                let expected = atlas.data[(oy + y) * layout.atlas_width + ox + x];
                assert_eq!(channel.intensity(x, y, z).unwrap(), expected);
            }
        }
    }
}

#[test]
fn test_fitted_layout_roundtrip() {
    let layout = AtlasLayout::fit(6, 4, 13).unwrap();
    assert!(layout.tiles <= layout.rows * layout.cols);
    let atlas = patterned_atlas(&layout);
    let volume = unpack(&atlas, &layout).unwrap();
    assert_eq!(pack(&volume, &layout).unwrap(), atlas);
}
