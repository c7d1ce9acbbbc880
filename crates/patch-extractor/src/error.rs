//! Error types for patch extraction.

use projection::ProjectionError;
use thiserror::Error;

/// Errors that can occur while planning, grouping or reading patches.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// A coordinate transform failed (point outside the CRS domain,
    /// unknown CRS, ...). Affects a single point.
    #[error("reprojection failed: {0}")]
    Reprojection(#[from] ProjectionError),

    /// The raster could not be opened.
    #[error("failed to open raster {path}: {message}")]
    OpenFailed { path: String, message: String },

    /// The raster backend failed to read or decode pixel data.
    #[error("raster read failed for {path} window {window}: {message}")]
    RasterIo {
        path: String,
        window: String,
        message: String,
    },

    /// The raster returned a sample type that cannot become 8-bit RGB.
    #[error("image type {0} not supported")]
    PixelType(String),

    /// The raster returned integer values outside 0-255.
    #[error("pixel values have a range of {min}-{max}; only 0-255 is supported")]
    PixelRange { min: i64, max: i64 },

    /// A member window does not fit in its group buffer. Indicates a
    /// grouping bug rather than bad input.
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),

    /// A computed window is unusable (e.g. zero area).
    #[error("invalid window for {window_id}: {message}")]
    InvalidWindow { window_id: String, message: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ExtractError {
    /// Create an OpenFailed error.
    pub fn open_failed(path: impl Into<String>, message: impl ToString) -> Self {
        Self::OpenFailed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a RasterIo error.
    pub fn raster_io(
        path: impl Into<String>,
        window: impl ToString,
        message: impl ToString,
    ) -> Self {
        Self::RasterIo {
            path: path.into(),
            window: window.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an InternalConsistency error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalConsistency(msg.into())
    }

    /// Create an InvalidWindow error.
    pub fn invalid_window(window_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidWindow {
            window_id: window_id.into(),
            message: message.into(),
        }
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error signals a logic defect that must not be swallowed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InternalConsistency(_))
    }
}

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        Self::RasterIo {
            path: String::new(),
            window: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<tiff::TiffError> for ExtractError {
    fn from(err: tiff::TiffError) -> Self {
        Self::RasterIo {
            path: String::new(),
            window: String::new(),
            message: err.to_string(),
        }
    }
}

/// Result type for patch extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_internal_errors_are_fatal() {
        assert!(ExtractError::internal("member exceeds group").is_fatal());
        assert!(!ExtractError::PixelRange { min: 0, max: 300 }.is_fatal());
        assert!(!ExtractError::raster_io("a.tif", "(0, 0, 1, 1)", "eof").is_fatal());
        assert!(!ExtractError::PixelType("f32".into()).is_fatal());
    }

    #[test]
    fn test_range_message() {
        let err = ExtractError::PixelRange { min: 0, max: 4095 };
        assert_eq!(
            err.to_string(),
            "pixel values have a range of 0-4095; only 0-255 is supported"
        );
    }
}
