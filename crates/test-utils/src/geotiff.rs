//! Small GeoTIFF writers for end-to-end read tests.
//!
//! Files are stripped, uncompressed and chunky (pixel-interleaved), with
//! ModelPixelScale, ModelTiepoint and a GeoKeyDirectory naming the
//! scene's EPSG code.

use ndarray::Array3;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tiff::TiffResult;

use crate::fixtures::GeoScene;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;

const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// GeoKeyDirectory for a scene: model type, raster type and EPSG code.
pub fn geo_key_directory(scene: &GeoScene) -> Vec<u16> {
    let epsg = scene.crs.epsg() as u16;
    let (model_type, crs_key) = if scene.crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_GEO_KEY)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_GEO_KEY)
    };

    // [version, revision, minor, count] then [key, location, count, value]
    let mut keys = vec![1, 1, 0, 3];
    keys.extend_from_slice(&[GT_MODEL_TYPE_GEO_KEY, 0, 1, model_type]);
    keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
    keys.extend_from_slice(&[crs_key, 0, 1, epsg]);
    keys
}

fn write_geotiff<C>(
    path: &Path,
    scene: &GeoScene,
    samples: &[C::Inner],
    rows_per_strip: Option<u32>,
) -> TiffResult<()>
where
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file)?;
    let mut image = encoder.new_image::<C>(scene.width as u32, scene.height as u32)?;
    if let Some(rows) = rows_per_strip {
        image.rows_per_strip(rows)?;
    }

    let t = scene.transform;
    let pixel_scale = [t.a, -t.e, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.c, t.f, 0.0];
    let geo_keys = geo_key_directory(scene);

    let dir = image.encoder();
    dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), pixel_scale.as_slice())?;
    dir.write_tag(Tag::Unknown(MODEL_TIEPOINT), tiepoint.as_slice())?;
    dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), geo_keys.as_slice())?;

    image.write_data(samples)
}

/// Reorder `(bands, rows, cols)` to pixel-interleaved samples.
fn interleave<T: Copy>(pixels: &Array3<T>) -> Vec<T> {
    pixels.view().permuted_axes([1, 2, 0]).iter().copied().collect()
}

fn check_shape<T>(scene: &GeoScene, pixels: &Array3<T>) {
    assert_eq!(
        pixels.dim(),
        (3, scene.height, scene.width),
        "pixels must be (3, height, width) for the scene"
    );
}

/// Write a 3-band 8-bit GeoTIFF for `scene`.
///
/// `pixels` is `(3, height, width)`. `rows_per_strip` controls the strip
/// height; `None` keeps the encoder default.
pub fn write_rgb8_geotiff(
    path: &Path,
    scene: &GeoScene,
    pixels: &Array3<u8>,
    rows_per_strip: Option<u32>,
) -> TiffResult<()> {
    check_shape(scene, pixels);
    write_geotiff::<colortype::RGB8>(path, scene, &interleave(pixels), rows_per_strip)
}

/// Write a 3-band 16-bit GeoTIFF for `scene`.
pub fn write_rgb16_geotiff(
    path: &Path,
    scene: &GeoScene,
    pixels: &Array3<u16>,
    rows_per_strip: Option<u32>,
) -> TiffResult<()> {
    check_shape(scene, pixels);
    write_geotiff::<colortype::RGB16>(path, scene, &interleave(pixels), rows_per_strip)
}

/// Write an 8-bit GeoTIFF named `name` into a fresh temporary directory.
///
/// Keep the returned [`TempDir`] alive for as long as the file is used.
///
/// # Panics
///
/// Panics if the directory or file cannot be written.
pub fn temp_rgb8_geotiff(
    name: &str,
    scene: &GeoScene,
    pixels: &Array3<u8>,
    rows_per_strip: Option<u32>,
) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    write_rgb8_geotiff(&path, scene, pixels, rows_per_strip).expect("write GeoTIFF");
    (dir, path)
}

/// Write a 16-bit GeoTIFF named `name` into a fresh temporary directory.
///
/// # Panics
///
/// Panics if the directory or file cannot be written.
pub fn temp_rgb16_geotiff(
    name: &str,
    scene: &GeoScene,
    pixels: &Array3<u16>,
    rows_per_strip: Option<u32>,
) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    write_rgb16_geotiff(&path, scene, pixels, rows_per_strip).expect("write GeoTIFF");
    (dir, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::rgb_gradient;
    use tiff::decoder::{Decoder, DecodingResult};

    #[test]
    fn test_geo_key_directory_projected() {
        let scene = GeoScene::oregon(4, 4, 1.0);
        assert_eq!(
            geo_key_directory(&scene),
            vec![1, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, 32610]
        );
    }

    #[test]
    fn test_written_file_decodes() {
        let scene = GeoScene::oregon(16, 8, 1.0);
        let pixels = rgb_gradient(16, 8);
        let (_dir, path) = temp_rgb8_geotiff("scene.tif", &scene, &pixels, Some(4));

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (16, 8));
        assert_eq!(decoder.chunk_dimensions(), (16, 4));

        let scale = decoder
            .find_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
            .unwrap()
            .unwrap()
            .into_f64_vec()
            .unwrap();
        assert_eq!(scale, vec![1.0, 1.0, 0.0]);

        match decoder.read_image().unwrap() {
            DecodingResult::U8(samples) => {
                assert_eq!(samples.len(), 16 * 8 * 3);
                // Pixel (row 1, col 2), green band
                assert_eq!(samples[(16 + 2) * 3 + 1], pixels[[1, 1, 2]]);
            }
            _ => panic!("expected 8-bit samples"),
        }
    }
}
