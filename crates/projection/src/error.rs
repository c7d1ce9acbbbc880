//! Error types for coordinate reference system handling.

use thiserror::Error;

/// Errors that can occur while parsing a CRS or reprojecting coordinates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    /// The CRS string could not be parsed.
    #[error("invalid CRS identifier: {0}")]
    InvalidCrs(String),

    /// The EPSG code has no entry in the projection database.
    #[error("EPSG:{0} is not in the crs-definitions database")]
    UnknownCrs(u32),

    /// The PROJ.4 definition for a known code could not be instantiated.
    #[error("invalid projection definition for {crs}: {message}")]
    InvalidDefinition { crs: String, message: String },

    /// A coordinate could not be represented in the destination CRS.
    #[error("cannot reproject ({x}, {y}) from {source_crs} to {target_crs}: {message}")]
    Reprojection {
        x: f64,
        y: f64,
        source_crs: String,
        target_crs: String,
        message: String,
    },
}

impl ProjectionError {
    /// Create a Reprojection error.
    pub fn reprojection(
        x: f64,
        y: f64,
        source_crs: impl ToString,
        target_crs: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::Reprojection {
            x,
            y,
            source_crs: source_crs.to_string(),
            target_crs: target_crs.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
