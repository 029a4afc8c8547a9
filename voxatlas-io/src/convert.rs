//! Bit-depth reduction for sources wider than 8 bits.

use rayon::prelude::*;

/// Samples per rayon work unit.
const CHUNK: usize = 1 << 16;

/// Rescales samples linearly so the smallest maps to 0 and the largest to 255.
///
/// Values are rounded to the nearest byte. Constant input has no range to
/// stretch and maps to all zeros. Non-finite samples are treated as the minimum.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_u8_min_max<T>(data: &[T]) -> Vec<u8>
where
    T: Copy + Into<f64> + Send + Sync,
{
    let (min, max) = data
        .par_chunks(CHUNK)
        .map(|chunk| {
            chunk
                .iter()
                .map(|&v| Into::<f64>::into(v))
                .filter(|v| v.is_finite())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                })
        })
        .reduce(
            || (f64::INFINITY, f64::NEG_INFINITY),
            |(a_lo, a_hi), (b_lo, b_hi)| (a_lo.min(b_lo), a_hi.max(b_hi)),
        );

    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return vec![0; data.len()];
    }
    let scale = 255.0 / range;
    data.par_iter()
        .with_min_len(CHUNK)
        .map(|&v| {
            let v: f64 = v.into();
            if v.is_finite() {
                ((v - min) * scale).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_range_maps_to_full_byte_range() {
        let data: Vec<u16> = vec![1000, 2000, 3000];
        assert_eq!(to_u8_min_max(&data), vec![0, 128, 255]);
    }

    #[test]
    fn test_constant_input_is_zero() {
        assert_eq!(to_u8_min_max(&[42u16; 5]), vec![0; 5]);
        assert!(to_u8_min_max::<u16>(&[]).is_empty());
    }

    #[test]
    fn test_float_input_ignores_nan() {
        let data = [0.5f32, f32::NAN, 1.5];
        assert_eq!(to_u8_min_max(&data), vec![0, 0, 255]);
    }
}
