//! GeoTIFF rasters decoded with the `tiff` crate.
//!
//! Only the strips or tiles that intersect a read window are decoded.
//! Decoded blocks go through a [`BlockCache`] shared by every raster the
//! opener produced, so overlapping group reads on one scene decode each
//! block once.

use projection::{Affine, Crs};
use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use super::{
    plan_read, Overlap, PixelBuffer, PixelData, RasterDataset, RasterEnv, RasterOpener, SampleType,
};
use crate::cache::{hash_path, BlockCache, BlockSamples, DecodedBlock};
use crate::config::megabytes;
use crate::error::{ExtractError, Result};
use crate::types::{CacheStats, PixelWindow};
use ndarray::Array3;

/// ModelPixelScaleTag
const MODEL_PIXEL_SCALE: u16 = 33550;
/// ModelTiepointTag
const MODEL_TIEPOINT: u16 = 33922;
/// ModelTransformationTag
const MODEL_TRANSFORMATION: u16 = 34264;
/// GeoKeyDirectoryTag
const GEO_KEY_DIRECTORY: u16 = 34735;

/// GTRasterTypeGeoKey
const KEY_RASTER_TYPE: u32 = 1025;
/// GeographicTypeGeoKey
const KEY_GEOGRAPHIC_TYPE: u32 = 2048;
/// ProjectedCSTypeGeoKey
const KEY_PROJECTED_TYPE: u32 = 3072;
/// RasterPixelIsPoint
const RASTER_PIXEL_IS_POINT: u32 = 2;
/// GeoTIFF "user-defined" marker
const USER_DEFINED: u32 = 32767;

/// Backend option overriding the block cache budget, in megabytes.
pub const GDAL_CACHEMAX: &str = "GDAL_CACHEMAX";

type TiffDecoder = Decoder<BufReader<File>>;

/// A GeoTIFF file opened for windowed reads.
///
/// The decoder is not safe for concurrent use, so block decodes on one
/// raster serialize on a mutex. Cache hits do not take that lock.
pub struct GeoTiffRaster {
    path: String,
    path_hash: u64,
    crs: Crs,
    transform: Affine,
    width: usize,
    height: usize,
    samples_per_pixel: usize,
    sample_type: SampleType,
    block_width: usize,
    block_height: usize,
    blocks_across: usize,
    decoder: Mutex<TiffDecoder>,
    cache: Arc<Mutex<BlockCache>>,
}

impl GeoTiffRaster {
    /// Open `path`, reading its georeferencing and block layout.
    pub fn open(path: &str, cache: Arc<Mutex<BlockCache>>) -> Result<Self> {
        let file = File::open(path).map_err(|e| ExtractError::open_failed(path, e))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| ExtractError::open_failed(path, e))?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder
            .dimensions()
            .map_err(|e| ExtractError::open_failed(path, e))?;
        let samples_per_pixel = first_u32(&mut decoder, Tag::SamplesPerPixel)
            .map_err(|e| ExtractError::open_failed(path, e))?
            .unwrap_or(1) as usize;
        let sample_type =
            sample_type(&mut decoder).map_err(|e| ExtractError::open_failed(path, e))?;

        let geo_keys = geo_keys(&mut decoder).map_err(|e| ExtractError::open_failed(path, e))?;
        let crs = crs_from_keys(&geo_keys)
            .ok_or_else(|| ExtractError::open_failed(path, "no EPSG code in GeoKeyDirectory"))?;
        let mut transform = georeferencing(&mut decoder)
            .map_err(|e| ExtractError::open_failed(path, e))?
            .ok_or_else(|| ExtractError::open_failed(path, "raster is not georeferenced"))?;
        if geo_key(&geo_keys, KEY_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
            let (x, y) = transform.apply(-0.5, -0.5);
            transform = transform.with_origin(x, y);
        }
        if !transform.is_invertible() {
            return Err(ExtractError::open_failed(path, "transform is not invertible"));
        }

        let (block_width, block_height) = decoder.chunk_dimensions();
        let (block_width, block_height) = (block_width as usize, block_height as usize);
        if block_width == 0 || block_height == 0 {
            return Err(ExtractError::open_failed(path, "zero-sized strips or tiles"));
        }

        tracing::debug!(
            raster_path = %path,
            crs = %crs,
            width,
            height,
            bands = samples_per_pixel,
            sample_type = %sample_type,
            block_width,
            block_height,
            "Opened GeoTIFF"
        );

        Ok(Self {
            path: path.to_string(),
            path_hash: hash_path(path),
            crs,
            transform,
            width: width as usize,
            height: height as usize,
            samples_per_pixel,
            sample_type,
            block_width,
            block_height,
            blocks_across: (width as usize).div_ceil(block_width),
            decoder: Mutex::new(decoder),
            cache,
        })
    }

    /// Strip or tile size in pixels as (width, height).
    pub fn block_size(&self) -> (usize, usize) {
        (self.block_width, self.block_height)
    }

    fn cache(&self) -> MutexGuard<'_, BlockCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a decoded block, from the cache when possible.
    fn block(&self, index: usize, window: &PixelWindow) -> Result<Arc<DecodedBlock>> {
        let key = (self.path_hash, index);
        if let Some(block) = self.cache().get(&key) {
            return Ok(block);
        }

        let result = {
            let mut decoder = self.decoder.lock().unwrap_or_else(PoisonError::into_inner);
            decoder
                .read_chunk(index as u32)
                .map_err(|e| ExtractError::raster_io(&self.path, window, e))?
        };

        let samples = widen(result);
        let len = match &samples {
            BlockSamples::Int(v) => v.len(),
            BlockSamples::Float(v) => v.len(),
        };
        // Edge blocks may come back padded to the full block width or cropped
        let full_row = self.block_width * self.samples_per_pixel;
        let rows_in_block = self
            .block_height
            .min(self.height - (index / self.blocks_across) * self.block_height);
        let cols_in_block = self
            .block_width
            .min(self.width - (index % self.blocks_across) * self.block_width);
        let stride = if len >= full_row * rows_in_block {
            self.block_width
        } else {
            cols_in_block
        };
        if len < stride * rows_in_block * self.samples_per_pixel {
            return Err(ExtractError::raster_io(
                &self.path,
                window,
                format!("block {index} decoded to {len} samples"),
            ));
        }

        let block = Arc::new(DecodedBlock {
            width: stride,
            height: rows_in_block,
            samples_per_pixel: self.samples_per_pixel,
            samples,
        });
        self.cache().insert(key, block.clone());
        Ok(block)
    }
}

impl RasterDataset for GeoTiffRaster {
    fn path(&self) -> &str {
        &self.path
    }

    fn crs(&self) -> Crs {
        self.crs
    }

    fn transform(&self) -> Affine {
        self.transform
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn band_count(&self) -> usize {
        self.samples_per_pixel
    }

    fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    fn read(
        &self,
        bands: &[usize],
        window: &PixelWindow,
        boundless: bool,
        fill_value: f64,
    ) -> Result<PixelData> {
        let overlap = plan_read(self, bands, window, boundless)?;
        let shape = (bands.len(), window.height as usize, window.width as usize);
        let mut buffer = if self.sample_type.is_integer() {
            PixelBuffer::Int(Array3::from_elem(shape, fill_value.round() as i32))
        } else {
            PixelBuffer::Float(Array3::from_elem(shape, fill_value))
        };

        let Some(o) = overlap else {
            return Ok(PixelData {
                sample_type: self.sample_type,
                buffer,
            });
        };

        let first_block_row = o.src_row / self.block_height;
        let last_block_row = (o.src_row + o.height - 1) / self.block_height;
        let first_block_col = o.src_col / self.block_width;
        let last_block_col = (o.src_col + o.width - 1) / self.block_width;

        for block_row in first_block_row..=last_block_row {
            for block_col in first_block_col..=last_block_col {
                let index = block_row * self.blocks_across + block_col;
                let block = self.block(index, window)?;
                let origin = (block_col * self.block_width, block_row * self.block_height);
                match (&mut buffer, &block.samples) {
                    (PixelBuffer::Int(out), BlockSamples::Int(samples)) => {
                        blit(out, samples, &block, origin, bands, &o)
                    }
                    (PixelBuffer::Float(out), BlockSamples::Float(samples)) => {
                        blit(out, samples, &block, origin, bands, &o)
                    }
                    _ => {
                        return Err(ExtractError::raster_io(
                            &self.path,
                            window,
                            format!("block {index} does not match sample type {}", self.sample_type),
                        ))
                    }
                }
            }
        }

        Ok(PixelData {
            sample_type: self.sample_type,
            buffer,
        })
    }
}

impl std::fmt::Debug for GeoTiffRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffRaster")
            .field("path", &self.path)
            .field("crs", &self.crs)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bands", &self.samples_per_pixel)
            .field("sample_type", &self.sample_type)
            .finish()
    }
}

/// Copy the part of `block` inside the overlap into the output buffer.
fn blit<T: Copy>(
    out: &mut Array3<T>,
    samples: &[T],
    block: &DecodedBlock,
    (block_col, block_row): (usize, usize),
    bands: &[usize],
    overlap: &Overlap,
) {
    let row0 = overlap.src_row.max(block_row);
    let row1 = (overlap.src_row + overlap.height).min(block_row + block.height);
    let col0 = overlap.src_col.max(block_col);
    let col1 = (overlap.src_col + overlap.width).min(block_col + block.width);

    for row in row0..row1 {
        let dst_row = overlap.dst_row + (row - overlap.src_row);
        for col in col0..col1 {
            let dst_col = overlap.dst_col + (col - overlap.src_col);
            let base = ((row - block_row) * block.width + (col - block_col)) * block.samples_per_pixel;
            for (i, band) in bands.iter().enumerate() {
                out[[i, dst_row, dst_col]] = samples[base + band - 1];
            }
        }
    }
}

/// Widen decoded samples to the buffer types used for reads.
fn widen(result: DecodingResult) -> BlockSamples {
    #[allow(unreachable_patterns)]
    match result {
        DecodingResult::U8(v) => BlockSamples::Int(v.into_iter().map(i32::from).collect()),
        DecodingResult::U16(v) => BlockSamples::Int(v.into_iter().map(i32::from).collect()),
        DecodingResult::I8(v) => BlockSamples::Int(v.into_iter().map(i32::from).collect()),
        DecodingResult::I16(v) => BlockSamples::Int(v.into_iter().map(i32::from).collect()),
        DecodingResult::I32(v) => BlockSamples::Int(v),
        DecodingResult::U32(v) => BlockSamples::Int(
            v.into_iter()
                .map(|x| i32::try_from(x).unwrap_or(i32::MAX))
                .collect(),
        ),
        DecodingResult::U64(v) => BlockSamples::Int(
            v.into_iter()
                .map(|x| i32::try_from(x).unwrap_or(i32::MAX))
                .collect(),
        ),
        DecodingResult::I64(v) => BlockSamples::Int(
            v.into_iter()
                .map(|x| x.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
                .collect(),
        ),
        DecodingResult::F32(v) => BlockSamples::Float(v.into_iter().map(f64::from).collect()),
        DecodingResult::F64(v) => BlockSamples::Float(v),
        _ => BlockSamples::Float(Vec::new()),
    }
}

fn first_u32(decoder: &mut TiffDecoder, tag: Tag) -> tiff::TiffResult<Option<u32>> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(value.into_u32_vec()?.first().copied()),
        None => Ok(None),
    }
}

fn sample_type(decoder: &mut TiffDecoder) -> std::result::Result<SampleType, String> {
    let bits = first_u32(decoder, Tag::BitsPerSample)
        .map_err(|e| e.to_string())?
        .unwrap_or(1);
    // 1 = unsigned, 2 = signed, 3 = IEEE float
    let format = first_u32(decoder, Tag::SampleFormat)
        .map_err(|e| e.to_string())?
        .unwrap_or(1);

    match (format, bits) {
        (1, 8) => Ok(SampleType::Uint8),
        (1, 16) => Ok(SampleType::Uint16),
        (1, 32) => Ok(SampleType::Uint32),
        (2, 8) => Ok(SampleType::Int8),
        (2, 16) => Ok(SampleType::Int16),
        (2, 32) => Ok(SampleType::Int32),
        (3, 32) => Ok(SampleType::Float32),
        (3, 64) => Ok(SampleType::Float64),
        _ => Err(format!(
            "unsupported sample format {format} with {bits} bits per sample"
        )),
    }
}

fn f64_tag(decoder: &mut TiffDecoder, tag: u16) -> tiff::TiffResult<Option<Vec<f64>>> {
    match decoder.find_tag(Tag::from_u16_exhaustive(tag))? {
        Some(value) => Ok(Some(value.into_f64_vec()?)),
        None => Ok(None),
    }
}

/// Read the pixel -> model transform from the GeoTIFF tags.
fn georeferencing(decoder: &mut TiffDecoder) -> tiff::TiffResult<Option<Affine>> {
    if let Some(m) = f64_tag(decoder, MODEL_TRANSFORMATION)? {
        if m.len() >= 8 {
            return Ok(Some(Affine::new(m[0], m[1], m[3], m[4], m[5], m[7])));
        }
    }

    let scale = f64_tag(decoder, MODEL_PIXEL_SCALE)?;
    let tiepoint = f64_tag(decoder, MODEL_TIEPOINT)?;
    match (scale, tiepoint) {
        (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
            let (sx, sy) = (scale[0], scale[1]);
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            Ok(Some(Affine::new(sx, 0.0, x - i * sx, 0.0, -sy, y + j * sy)))
        }
        _ => Ok(None),
    }
}

/// Parse the GeoKeyDirectory into (key, value) pairs for inline SHORT keys.
fn geo_keys(decoder: &mut TiffDecoder) -> tiff::TiffResult<Vec<(u32, u32)>> {
    let directory = match decoder.find_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))? {
        Some(value) => value.into_u32_vec()?,
        None => return Ok(Vec::new()),
    };
    if directory.len() < 4 {
        return Ok(Vec::new());
    }

    let count = directory[3] as usize;
    Ok(directory[4..]
        .chunks_exact(4)
        .take(count)
        // Location 0 means the value is stored inline
        .filter(|entry| entry[1] == 0)
        .map(|entry| (entry[0], entry[3]))
        .collect())
}

fn geo_key(keys: &[(u32, u32)], key: u32) -> Option<u32> {
    keys.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Projected CRS takes precedence over geographic.
fn crs_from_keys(keys: &[(u32, u32)]) -> Option<Crs> {
    [KEY_PROJECTED_TYPE, KEY_GEOGRAPHIC_TYPE]
        .into_iter()
        .filter_map(|key| geo_key(keys, key))
        .find(|code| *code != 0 && *code != USER_DEFINED)
        .map(Crs::from_epsg)
}

/// Opens GeoTIFF files that share one block cache.
pub struct GeoTiffOpener {
    cache: Arc<Mutex<BlockCache>>,
}

impl GeoTiffOpener {
    /// Create an opener whose block cache holds up to `cache_bytes`.
    pub fn new(cache_bytes: usize) -> Self {
        Self {
            cache: Arc::new(Mutex::new(BlockCache::new(cache_bytes))),
        }
    }

    /// Get block cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats()
    }

    fn apply_env(&self, env: &RasterEnv) {
        for (key, value) in env {
            if key == GDAL_CACHEMAX {
                match value.trim().parse::<usize>() {
                    Ok(mb) => {
                        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
                        let bytes = megabytes(mb);
                        if cache.memory_limit() != bytes {
                            cache.set_memory_limit(bytes);
                            tracing::debug!(cache_mb = mb, "Resized block cache");
                        }
                    }
                    Err(_) => tracing::warn!(value = %value, "Ignoring invalid {}", GDAL_CACHEMAX),
                }
            } else {
                tracing::debug!(key = %key, value = %value, "Backend option has no effect on GeoTIFF reads");
            }
        }
    }
}

impl RasterOpener for GeoTiffOpener {
    fn open(&self, path: &str, env: &RasterEnv) -> Result<Arc<dyn RasterDataset>> {
        self.apply_env(env);
        Ok(Arc::new(GeoTiffRaster::open(path, self.cache.clone())?))
    }
}

impl std::fmt::Debug for GeoTiffOpener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffOpener")
            .field("cache", &self.cache_stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cachemax_saturates_on_huge_values() {
        let opener = GeoTiffOpener::new(1024);
        let mut env = RasterEnv::new();
        env.insert(GDAL_CACHEMAX.to_string(), usize::MAX.to_string());
        opener.apply_env(&env);

        let limit = opener.cache.lock().unwrap().memory_limit();
        assert_eq!(limit, usize::MAX);
    }

    #[test]
    fn test_crs_from_keys_prefers_projected() {
        let keys = vec![(1024, 1), (2048, 4326), (3072, 32610)];
        assert_eq!(crs_from_keys(&keys), Some(Crs::from_epsg(32610)));
    }

    #[test]
    fn test_crs_from_keys_geographic() {
        let keys = vec![(1024, 2), (2048, 4326)];
        assert_eq!(crs_from_keys(&keys), Some(Crs::WGS84));
    }

    #[test]
    fn test_crs_from_keys_user_defined() {
        let keys = vec![(3072, USER_DEFINED)];
        assert_eq!(crs_from_keys(&keys), None);
        assert_eq!(crs_from_keys(&[]), None);
    }

    #[test]
    fn test_widen_integer_types() {
        match widen(DecodingResult::U16(vec![0, 300, 65535])) {
            BlockSamples::Int(v) => assert_eq!(v, vec![0, 300, 65535]),
            other => panic!("unexpected {other:?}"),
        }
        match widen(DecodingResult::U32(vec![u32::MAX])) {
            BlockSamples::Int(v) => assert_eq!(v, vec![i32::MAX]),
            other => panic!("unexpected {other:?}"),
        }
        match widen(DecodingResult::F32(vec![0.5])) {
            BlockSamples::Float(v) => assert_eq!(v, vec![0.5]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_blit_respects_block_origin() {
        // 2x2 block of 3-band pixels at raster (col 2, row 2)
        let block = DecodedBlock {
            width: 2,
            height: 2,
            samples_per_pixel: 3,
            samples: BlockSamples::Int((0..12).collect()),
        };
        let samples: Vec<i32> = (0..12).collect();
        let overlap = Overlap {
            src_col: 1,
            src_row: 1,
            dst_col: 0,
            dst_row: 0,
            width: 3,
            height: 3,
        };
        let mut out = Array3::from_elem((2, 3, 3), -1);
        blit(&mut out, &samples, &block, (2, 2), &[1, 3], &overlap);

        assert_eq!(out[[0, 0, 0]], -1);
        // Raster (row 2, col 2) is block pixel 0
        assert_eq!(out[[0, 1, 1]], 0);
        assert_eq!(out[[1, 1, 1]], 2);
        // Raster (row 3, col 3) is block pixel 3
        assert_eq!(out[[0, 2, 2]], 9);
        assert_eq!(out[[1, 2, 2]], 11);
    }
}
