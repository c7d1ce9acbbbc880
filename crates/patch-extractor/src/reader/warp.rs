//! Bilinear warping of a source window into its target patch.

use ndarray::{Array3, ArrayView2, ArrayView3};
use projection::CoordinateTransformer;

use crate::error::{ExtractError, Result};
use crate::types::Window;

/// Bilinear interpolation at continuous pixel position `(x, y)`.
///
/// Pixel centers sit at integer + 0.5, matching GDAL. Positions outside the
/// image footprint return `None`; positions in the outer half pixel clamp
/// to the edge row or column.
pub fn bilinear_interpolate(data: &ArrayView2<'_, u8>, x: f64, y: f64) -> Option<f64> {
    let (height, width) = data.dim();
    if width == 0 || height == 0 {
        return None;
    }
    if !(x >= 0.0 && y >= 0.0 && x <= width as f64 && y <= height as f64) {
        return None;
    }

    let fx = (x - 0.5).max(0.0);
    let fy = (y - 0.5).max(0.0);
    let x0 = (fx.floor() as usize).min(width - 1);
    let y0 = (fy.floor() as usize).min(height - 1);
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let xf = (fx - x0 as f64).clamp(0.0, 1.0);
    let yf = (fy - y0 as f64).clamp(0.0, 1.0);

    let v00 = f64::from(data[[y0, x0]]);
    let v10 = f64::from(data[[y0, x1]]);
    let v01 = f64::from(data[[y1, x0]]);
    let v11 = f64::from(data[[y1, x1]]);

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    Some(top * (1.0 - yf) + bottom * yf)
}

/// Warp a `[band, row, col]` source window into a square
/// `[band, size, size]` patch in the window's target CRS.
///
/// Each output pixel center is mapped through the target transform, into
/// the source CRS, and through the inverse source transform, then sampled
/// bilinearly. Output pixels that fall outside the source window or cannot
/// be reprojected stay 0.
pub fn reproject(
    source: ArrayView3<'_, u8>,
    window: &Window,
    transformer: &CoordinateTransformer,
) -> Result<Array3<u8>> {
    let size = window.target_image_size;
    let bands = source.dim().0;
    let mut out = Array3::<u8>::zeros((bands, size, size));

    let to_source_pixel = window.source_transform.inverse().ok_or_else(|| {
        ExtractError::invalid_window(&window.window_id, "source transform is not invertible")
    })?;
    let to_source_crs = if window.source_crs == window.target_crs {
        None
    } else {
        Some(transformer.transformer(window.target_crs, window.source_crs)?)
    };

    let planes: Vec<ArrayView2<'_, u8>> = source.outer_iter().collect();
    for row in 0..size {
        for col in 0..size {
            let (tx, ty) = window
                .target_transform
                .apply(col as f64 + 0.5, row as f64 + 0.5);
            let (sx, sy) = match &to_source_crs {
                Some(t) => match t.transform(tx, ty) {
                    Ok(p) => p,
                    Err(_) => continue,
                },
                None => (tx, ty),
            };
            let (u, v) = to_source_pixel.apply(sx, sy);

            for (band, plane) in planes.iter().enumerate() {
                if let Some(value) = bilinear_interpolate(plane, u, v) {
                    out[[band, row, col]] = value.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelWindow;
    use ndarray::{array, Array2};
    use projection::{Affine, Crs};

    #[test]
    fn test_bilinear_at_pixel_centers() {
        let data = array![[10u8, 20], [30, 40]];
        let view = data.view();

        assert_eq!(bilinear_interpolate(&view, 0.5, 0.5), Some(10.0));
        assert_eq!(bilinear_interpolate(&view, 1.5, 0.5), Some(20.0));
        assert_eq!(bilinear_interpolate(&view, 0.5, 1.5), Some(30.0));
        assert_eq!(bilinear_interpolate(&view, 1.5, 1.5), Some(40.0));

        // Midway between all four centers
        let center = bilinear_interpolate(&view, 1.0, 1.0).unwrap();
        assert!((center - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_bilinear_edges_clamp() {
        let data = array![[10u8, 20], [30, 40]];
        let view = data.view();
        assert_eq!(bilinear_interpolate(&view, 0.0, 0.0), Some(10.0));
        assert_eq!(bilinear_interpolate(&view, 2.0, 2.0), Some(40.0));
    }

    #[test]
    fn test_bilinear_outside_is_none() {
        let data = array![[10u8, 20], [30, 40]];
        let view = data.view();
        assert_eq!(bilinear_interpolate(&view, -0.1, 1.0), None);
        assert_eq!(bilinear_interpolate(&view, 1.0, 2.1), None);
        assert_eq!(bilinear_interpolate(&view, f64::NAN, 1.0), None);
    }

    fn utm_window(source: Affine, target: Affine, size: usize) -> Window {
        let utm = Crs::from_epsg(32610);
        Window {
            window_id: "w".into(),
            pixels: PixelWindow::new(0, 0, size as i64, size as i64),
            source_crs: utm,
            source_transform: source,
            target_crs: utm,
            target_transform: target,
            target_image_size: size,
        }
    }

    #[test]
    fn test_identity_warp_copies_pixels() {
        let transformer = CoordinateTransformer::new();
        let source = Array3::from_shape_fn((3, 4, 4), |(b, r, c)| (b * 60 + r * 4 + c) as u8);
        let transform = Affine::from_origin(1000.0, 2000.0, 1.0, 1.0);
        let window = utm_window(transform, transform, 4);

        let out = reproject(source.view(), &window, &transformer).unwrap();
        assert_eq!(out, source);
    }

    #[test]
    fn test_half_resolution_upsamples() {
        let transformer = CoordinateTransformer::new();
        let plane = Array2::from_shape_fn((2, 2), |(r, c)| ((r * 2 + c) * 85) as u8);
        let source = plane.insert_axis(ndarray::Axis(0));
        let window = utm_window(
            Affine::from_origin(0.0, 2.0, 1.0, 1.0),
            Affine::from_origin(0.0, 2.0, 0.5, 0.5),
            4,
        );

        let out = reproject(source.view(), &window, &transformer).unwrap();
        assert_eq!(out.dim(), (1, 4, 4));
        // Outer pixels replicate the source corners
        assert_eq!(out[[0, 0, 0]], 0);
        assert_eq!(out[[0, 3, 3]], 255);
        // Inner pixels blend
        assert_eq!(out[[0, 1, 1]], 64);
    }

    #[test]
    fn test_outside_footprint_is_zero() {
        let transformer = CoordinateTransformer::new();
        let source = Array3::from_elem((3, 2, 2), 200u8);
        // Target covers twice the source extent to the east
        let window = utm_window(
            Affine::from_origin(0.0, 2.0, 1.0, 1.0),
            Affine::from_origin(0.0, 2.0, 1.0, 1.0),
            4,
        );

        let out = reproject(source.view(), &window, &transformer).unwrap();
        assert_eq!(out[[0, 0, 0]], 200);
        assert_eq!(out[[2, 1, 1]], 200);
        assert_eq!(out[[0, 0, 3]], 0);
        assert_eq!(out[[1, 3, 0]], 0);
    }
}
