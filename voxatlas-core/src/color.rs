//! Channel colors.

/// 8-bit RGB triple.
pub type Rgb = [u8; 3];

/// Default channel colors, assigned by channel index and repeated cyclically.
pub const DEFAULT_CHANNEL_COLORS: [Rgb; 12] = [
    [255, 0, 255],
    [255, 255, 255],
    [0, 255, 255],
    [255, 128, 0],
    [0, 255, 0],
    [255, 0, 0],
    [0, 128, 255],
    [255, 255, 0],
    [128, 0, 255],
    [0, 255, 128],
    [255, 0, 128],
    [128, 255, 0],
];

/// Default color for a channel index.
#[must_use]
pub fn default_channel_color(index: usize) -> Rgb {
    DEFAULT_CHANNEL_COLORS[index % DEFAULT_CHANNEL_COLORS.len()]
}

/// Returns true for `[0, 0, 0]`.
#[inline]
#[must_use]
pub fn is_black(color: Rgb) -> bool {
    color == [0, 0, 0]
}

/// Converts HSV (all components in `[0, 1]`) to 8-bit RGB.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::many_single_char_names
)]
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let h = h.rem_euclid(1.0) * 6.0;
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match sector as u8 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    let to_u8 = |c: f32| (c * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_colors_cycle() {
        assert_eq!(default_channel_color(0), DEFAULT_CHANNEL_COLORS[0]);
        assert_eq!(default_channel_color(12), DEFAULT_CHANNEL_COLORS[0]);
        assert!(DEFAULT_CHANNEL_COLORS.iter().all(|&c| !is_black(c)));
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [255, 0, 0]);
        assert_eq!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0), [0, 255, 0]);
        assert_eq!(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0), [0, 0, 255]);
        assert_eq!(hsv_to_rgb(0.5, 0.0, 1.0), [255, 255, 255]);
    }
}
