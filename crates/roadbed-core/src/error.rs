use thiserror::Error;

/// Terrain side lengths accepted by the pipeline.
pub const ALLOWED_SIZES: [usize; 7] = [256, 512, 1024, 2048, 4096, 8192, 16384];

/// Input-validation failures. These surface to the caller before the
/// pipeline starts; every other anomaly is recovered locally and counted
/// in [`crate::pipeline::DeformStats`].
#[derive(Debug, Error)]
pub enum DeformError {
    #[error("terrain size {0} is not supported (allowed: 256, 512, 1024, 2048, 4096, 8192, 16384)")]
    UnsupportedSize(usize),

    #[error("mask for material '{material}' is {found}x{found}, terrain is {expected}x{expected}")]
    MaskSizeMismatch {
        material: String,
        expected: usize,
        found: usize,
    },

    #[error("polyline in material '{material}' has {points} point(s), need at least 2")]
    DegeneratePolyline { material: String, points: usize },

    #[error("polyline point ({x}, {y}) in material '{material}' is outside [0, {size})")]
    PointOutOfBounds {
        material: String,
        x: f64,
        y: f64,
        size: usize,
    },

    #[error("parameter '{name}' is out of range: {value} ({constraint})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        constraint: &'static str,
    },

    #[error("distance transform input has invalid shape {width}x{height}")]
    InvalidShape { width: usize, height: usize },
}

pub type Result<T> = std::result::Result<T, DeformError>;

/// Validate a terrain side length against the allowed set.
pub fn check_terrain_size(size: usize) -> Result<()> {
    if ALLOWED_SIZES.contains(&size) {
        Ok(())
    } else {
        Err(DeformError::UnsupportedSize(size))
    }
}
