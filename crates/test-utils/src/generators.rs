//! Synthetic pixel data with predictable values.
//!
//! All generators return band-first arrays shaped `(bands, height, width)`,
//! matching what raster reads produce.

use ndarray::Array3;

/// Value of band `band` at `(row, col)` in an [`rgb_gradient`] of the given
/// size.
///
/// - band 0 (red) ramps from 0 to 255 left to right
/// - band 1 (green) ramps from 0 to 255 top to bottom
/// - band 2 (blue) ramps along the diagonal
///
/// # Example
///
/// ```
/// use test_utils::gradient_value;
///
/// assert_eq!(gradient_value(0, 0, 0, 100, 100), 0);
/// assert_eq!(gradient_value(0, 0, 99, 100, 100), 255);
/// assert_eq!(gradient_value(1, 99, 0, 100, 100), 255);
/// ```
pub fn gradient_value(band: usize, row: usize, col: usize, width: usize, height: usize) -> u8 {
    let across = width.saturating_sub(1).max(1);
    let down = height.saturating_sub(1).max(1);
    let value = match band {
        0 => col * 255 / across,
        1 => row * 255 / down,
        _ => (col + row) * 255 / (across + down),
    };
    value.min(255) as u8
}

/// Creates a smooth 3-band 8-bit gradient.
///
/// Neighboring pixels differ by at most a few levels, so bilinear sampling
/// stays close to the nearest-pixel value.
pub fn rgb_gradient(width: usize, height: usize) -> Array3<u8> {
    Array3::from_shape_fn((3, height, width), |(band, row, col)| {
        gradient_value(band, row, col, width, height)
    })
}

/// Creates a 3-band image filled with one color.
pub fn constant_rgb(width: usize, height: usize, color: [u8; 3]) -> Array3<u8> {
    Array3::from_shape_fn((3, height, width), |(band, _, _)| color[band])
}

/// Creates a 3-band 16-bit image whose values exceed the 8-bit range.
///
/// Each sample is `col + row + band * 1000`, so the maximum is well above
/// 255 for any image wider than a few pixels.
pub fn uint16_ramp(width: usize, height: usize) -> Array3<u16> {
    Array3::from_shape_fn((3, height, width), |(band, row, col)| {
        (col + row + band * 1000).min(u16::MAX as usize) as u16
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_gradient_shape_and_corners() {
        let image = rgb_gradient(10, 5);
        assert_eq!(image.dim(), (3, 5, 10));
        assert_eq!(image[[0, 0, 0]], 0);
        assert_eq!(image[[0, 0, 9]], 255);
        assert_eq!(image[[1, 4, 0]], 255);
        assert_eq!(image[[2, 4, 9]], 255);
    }

    #[test]
    fn test_rgb_gradient_is_smooth() {
        let image = rgb_gradient(1000, 1000);
        for band in 0..3 {
            let a = image[[band, 500, 500]] as i32;
            let b = image[[band, 501, 501]] as i32;
            assert!((a - b).abs() <= 1);
        }
    }

    #[test]
    fn test_single_pixel_gradient() {
        let image = rgb_gradient(1, 1);
        assert_eq!(image.into_raw_vec(), vec![0, 0, 0]);
    }

    #[test]
    fn test_constant_rgb() {
        let image = constant_rgb(4, 3, [10, 20, 30]);
        assert!(image.index_axis(ndarray::Axis(0), 1).iter().all(|&v| v == 20));
    }

    #[test]
    fn test_uint16_ramp_exceeds_u8() {
        let image = uint16_ramp(64, 64);
        assert_eq!(image[[0, 0, 0]], 0);
        assert_eq!(image[[2, 63, 63]], 2126);
        assert!(image.iter().any(|&v| v > 255));
    }
}
