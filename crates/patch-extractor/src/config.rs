//! Configuration for patch extraction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ExtractError, Result};

/// Configuration for the patch extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Edge length of the square output patches in pixels.
    pub patch_size: usize,

    /// Output resolution in target CRS units (meters) per pixel.
    pub resolution: f64,

    /// Largest merged read window edge in source pixels.
    pub max_patch_size: i64,

    /// Options forwarded verbatim to the raster backend.
    pub gdal_env: BTreeMap<String, String>,

    /// Number of rasters kept open at once.
    pub handle_pool_size: usize,

    /// Memory budget for decoded raster blocks in megabytes.
    pub block_cache_size_mb: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            patch_size: 256,
            resolution: 0.5,
            max_patch_size: 2048,
            gdal_env: BTreeMap::new(),
            handle_pool_size: 16,
            block_cache_size_mb: 256,
        }
    }
}

impl ExtractorConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PATCH_SIZE") {
            if let Ok(size) = val.parse() {
                config.patch_size = size;
            }
        }

        if let Ok(val) = std::env::var("PATCH_RESOLUTION") {
            if let Ok(res) = val.parse() {
                config.resolution = res;
            }
        }

        if let Ok(val) = std::env::var("MAX_PATCH_SIZE") {
            if let Ok(size) = val.parse() {
                config.max_patch_size = size;
            }
        }

        if let Ok(val) = std::env::var("RASTER_HANDLE_POOL_SIZE") {
            if let Ok(size) = val.parse() {
                config.handle_pool_size = size;
            }
        }

        if let Ok(val) = std::env::var("BLOCK_CACHE_SIZE_MB") {
            if let Ok(size) = val.parse() {
                config.block_cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("GDAL_ENV") {
            match parse_gdal_env(&split_gdal_env(&val)) {
                Ok(env) => config.gdal_env = env,
                Err(e) => tracing::warn!(error = %e, "Ignoring GDAL_ENV"),
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.patch_size == 0 {
            return Err(ExtractError::config("patch_size must be > 0"));
        }

        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(ExtractError::config(format!(
                "resolution must be a positive number, got {}",
                self.resolution
            )));
        }

        if self.max_patch_size <= 0 {
            return Err(ExtractError::config("max_patch_size must be > 0"));
        }

        if self.handle_pool_size == 0 {
            return Err(ExtractError::config("handle_pool_size must be > 0"));
        }

        Ok(())
    }

    /// Get the block cache size in bytes.
    pub fn block_cache_size_bytes(&self) -> usize {
        megabytes(self.block_cache_size_mb)
    }
}

/// `mb` megabytes in bytes, saturating at `usize::MAX`.
pub(crate) fn megabytes(mb: usize) -> usize {
    mb.saturating_mul(1024 * 1024)
}

/// Split a `GDAL_ENV` value into `KEY=VALUE` settings.
///
/// Settings are separated by `;` so values such as HTTP header lists may
/// contain commas.
fn split_gdal_env(val: &str) -> Vec<&str> {
    val.split(';').map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// Parse `VAR=value` settings into a backend environment map.
///
/// The value is everything after the first `=`, so values may themselves
/// contain `=`.
pub fn parse_gdal_env<S: AsRef<str>>(settings: &[S]) -> Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    for setting in settings {
        let setting = setting.as_ref();
        let (key, value) = setting.split_once('=').ok_or_else(|| {
            ExtractError::config(format!(
                "GDAL environment setting {setting:?} is not of the form VAR=value"
            ))
        })?;
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExtractorConfig::default();
        assert_eq!(config.patch_size, 256);
        assert_eq!(config.resolution, 0.5);
        assert_eq!(config.max_patch_size, 2048);
        assert!(config.gdal_env.is_empty());
        assert_eq!(config.handle_pool_size, 16);
        assert_eq!(config.block_cache_size_bytes(), 256 * 1024 * 1024);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ExtractorConfig::default();
        assert!(config.validate().is_ok());

        config.patch_size = 0;
        assert!(config.validate().is_err());

        config = ExtractorConfig::default();
        config.resolution = 0.0;
        assert!(config.validate().is_err());

        config.resolution = f64::NAN;
        assert!(config.validate().is_err());

        config = ExtractorConfig::default();
        config.max_patch_size = 0;
        assert!(config.validate().is_err());

        config = ExtractorConfig::default();
        config.handle_pool_size = 0;
        assert!(matches!(config.validate(), Err(ExtractError::Config(_))));
    }

    #[test]
    fn test_parse_gdal_env() {
        let env = parse_gdal_env(&[
            "GDAL_HTTP_MAX_RETRY=3",
            "AWS_SESSION_TOKEN=abc=def",
            "EMPTY=",
        ])
        .unwrap();
        assert_eq!(env["GDAL_HTTP_MAX_RETRY"], "3");
        assert_eq!(env["AWS_SESSION_TOKEN"], "abc=def");
        assert_eq!(env["EMPTY"], "");
    }

    #[test]
    fn test_parse_gdal_env_rejects_missing_separator() {
        let err = parse_gdal_env(&["GDAL_CACHEMAX"]).unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
    }

    #[test]
    fn test_gdal_env_values_keep_commas() {
        let settings = split_gdal_env("GDAL_HTTP_HEADERS=A: 1, B: 2; GDAL_CACHEMAX=64;");
        assert_eq!(settings, vec!["GDAL_HTTP_HEADERS=A: 1, B: 2", "GDAL_CACHEMAX=64"]);

        let env = parse_gdal_env(&settings).unwrap();
        assert_eq!(env["GDAL_HTTP_HEADERS"], "A: 1, B: 2");
        assert_eq!(env["GDAL_CACHEMAX"], "64");
    }

    #[test]
    fn test_huge_cache_size_saturates() {
        let config = ExtractorConfig {
            block_cache_size_mb: usize::MAX / 2,
            ..Default::default()
        };
        assert_eq!(config.block_cache_size_bytes(), usize::MAX);
        assert_eq!(megabytes(3), 3 * 1024 * 1024);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ExtractorConfig =
            serde_json::from_str(r#"{"patch_size": 128, "gdal_env": {"A": "1"}}"#).unwrap();
        assert_eq!(config.patch_size, 128);
        assert_eq!(config.max_patch_size, 2048);
        assert_eq!(config.gdal_env["A"], "1");
    }
}
