//! Error types for warping and detection.

use thiserror::Error;

/// Errors that can occur while loading, warping or analysing a raster.
#[derive(Debug, Error)]
pub enum WarpError {
    /// A quad was built from the wrong number of points.
    #[error("quad needs exactly 4 points, got {0}")]
    InvalidQuad(usize),

    /// Geometry that cannot be mapped (zero-length edges, collapsed quads).
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// The source image could not be decoded.
    #[error("failed to decode source image: {0}")]
    DecodeFailure(#[from] image::ImageError),

    /// A canvas or raster could not be allocated.
    #[error("raster unavailable: {0}")]
    ResourceUnavailable(String),

    /// Out-of-range option or argument.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

/// Result type for warp operations
pub type WarpResult<T> = Result<T, WarpError>;
