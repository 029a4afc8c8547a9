//! Packed-channel PNG atlases.
//!
//! One RGBA atlas image carries up to four channels, one per color plane
//! in R, G, B, A order.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, RgbaImage};
use rayon::prelude::*;

use crate::reader::MappedFileReader;
use crate::{Error, Result};

/// Most channels one RGBA image can carry.
pub const MAX_PACKED_CHANNELS: usize = 4;

/// Decoded atlas planes from one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedAtlas {
    /// Atlas width in pixels.
    pub width: usize,
    /// Atlas height in pixels.
    pub height: usize,
    /// One `width * height` plane per requested channel.
    pub planes: Vec<Vec<u8>>,
}

/// Decodes an encoded image and splits its first `channels` color planes.
///
/// Grayscale images decode with the gray value in R, G and B.
///
/// # Errors
/// Returns [`Error::Image`] if decoding fails, or [`Error::InvalidFormat`] if
/// more than [`MAX_PACKED_CHANNELS`] planes are requested.
pub fn decode_packed_atlas(bytes: &[u8], channels: usize) -> Result<PackedAtlas> {
    if channels > MAX_PACKED_CHANNELS {
        return Err(Error::InvalidFormat(format!(
            "{channels} channels requested from one image (max {MAX_PACKED_CHANNELS})"
        )));
    }
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let width = rgba.width() as usize;
    let height = rgba.height() as usize;
    let raw = rgba.as_raw();

    let planes: Vec<Vec<u8>> = (0..channels)
        .into_par_iter()
        .map(|plane| raw.chunks_exact(4).map(|px| px[plane]).collect())
        .collect();
    Ok(PackedAtlas {
        width,
        height,
        planes,
    })
}

/// Reads and decodes a packed atlas file.
///
/// # Errors
/// See [`decode_packed_atlas`]; also fails if the file cannot be read.
pub fn read_packed_atlas<P: AsRef<Path>>(path: P, channels: usize) -> Result<PackedAtlas> {
    let reader = MappedFileReader::open(path)?;
    decode_packed_atlas(reader.as_bytes(), channels)
}

/// Encodes up to four planes as an RGBA PNG. Missing planes are 0, except
/// alpha, which is 255 when absent.
///
/// # Errors
/// Returns [`Error::InvalidFormat`] for too many planes or wrong plane sizes.
pub fn encode_packed_atlas(planes: &[&[u8]], width: usize, height: usize) -> Result<Vec<u8>> {
    if planes.len() > MAX_PACKED_CHANNELS {
        return Err(Error::InvalidFormat(format!(
            "{} planes do not fit one RGBA image",
            planes.len()
        )));
    }
    let len = width * height;
    if let Some(bad) = planes.iter().find(|p| p.len() != len) {
        return Err(Error::InvalidFormat(format!(
            "plane has {} bytes, expected {len}",
            bad.len()
        )));
    }

    let mut raw = vec![0u8; len * 4];
    for (i, px) in raw.chunks_exact_mut(4).enumerate() {
        px[3] = 255;
        for (plane, data) in planes.iter().enumerate() {
            px[plane] = data[i];
        }
    }
    let (w, h) = (
        u32::try_from(width).map_err(|_| Error::InvalidFormat(format!("width {width}")))?,
        u32::try_from(height).map_err(|_| Error::InvalidFormat(format!("height {height}")))?,
    );
    let image = RgbaImage::from_raw(w, h, raw)
        .ok_or_else(|| Error::InvalidFormat("RGBA buffer size".to_string()))?;

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image).write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planes_survive_png() {
        let r: Vec<u8> = (0..12).collect();
        let g: Vec<u8> = (0..12).map(|v| 255 - v).collect();
        let a: Vec<u8> = vec![7; 12];
        let b = vec![0u8; 12];
        let png = encode_packed_atlas(&[&r, &g, &b, &a], 4, 3).unwrap();

        let atlas = decode_packed_atlas(&png, 4).unwrap();
        assert_eq!((atlas.width, atlas.height), (4, 3));
        assert_eq!(atlas.planes[0], r);
        assert_eq!(atlas.planes[1], g);
        assert_eq!(atlas.planes[3], a);

        let two = decode_packed_atlas(&png, 2).unwrap();
        assert_eq!(two.planes.len(), 2);
    }

    #[test]
    fn test_too_many_channels() {
        assert!(matches!(
            decode_packed_atlas(&[], 5),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(decode_packed_atlas(&[1, 2, 3], 1), Err(Error::Image(_))));
    }
}
