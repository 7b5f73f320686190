//! Coordinate normalization from loosely specified inputs to device pixels.
//!
//! A vision model tends to answer in fractions of the screen, while OCR or
//! accessibility dumps give absolute pixels. Inputs are classified by magnitude:
//!
//! | Range            | Meaning                       | Clamp        |
//! |------------------|-------------------------------|--------------|
//! | `0 <= v <= 1`    | fraction of the dimension     | `[0, d]`     |
//! | `1 < v <= 1000`  | per-mille of the dimension    | `[0, d]`     |
//! | `v > 1000`       | already a pixel coordinate    | `[0, d - 1]` |
//!
//! Negative inputs always map to `0`.

/// Upper bound (inclusive) of the per-mille coordinate range.
pub const THOUSANDTHS_MAX: f64 = 1000.0;

/// Coordinate system inferred from the magnitude of an input value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystem {
    /// Fraction of the screen dimension (`0.0..=1.0`).
    Normalized,
    /// Thousandths of the screen dimension (`1..=1000`).
    Thousandths,
    /// Absolute device pixels.
    Pixel,
}

impl CoordinateSystem {
    /// Classify a non-negative value.
    pub fn detect(value: f64) -> Self {
        if value <= 1.0 {
            CoordinateSystem::Normalized
        } else if value <= THOUSANDTHS_MAX {
            CoordinateSystem::Thousandths
        } else {
            CoordinateSystem::Pixel
        }
    }
}

/// Convert a single coordinate to a pixel position on an axis of `dimension` pixels.
///
/// Fractions are rounded to the nearest pixel.
pub fn normalize_coordinate(value: f64, dimension: u32) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }

    let dim = dimension as f64;
    match CoordinateSystem::detect(value) {
        CoordinateSystem::Normalized => (value * dim).round().clamp(0.0, dim) as u32,
        CoordinateSystem::Thousandths => {
            (value / THOUSANDTHS_MAX * dim).round().clamp(0.0, dim) as u32
        }
        CoordinateSystem::Pixel => {
            let max = dimension.saturating_sub(1) as f64;
            value.round().clamp(0.0, max) as u32
        }
    }
}

/// Convert an `(x, y)` pair against a `(width, height)` screen.
pub fn normalize_point(x: f64, y: f64, width: u32, height: u32) -> (u32, u32) {
    (
        normalize_coordinate(x, width),
        normalize_coordinate(y, height),
    )
}
