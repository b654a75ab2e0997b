//! Grid-sampled corner features.
//!
//! The detector walks a regular grid and scores every grid point with the
//! product of its forward horizontal and vertical intensity differences.
//! It is intentionally cheap: no smoothing, no structure tensor, no
//! non-maximum suppression. Trackers consuming the marker files are tuned
//! to the density and spread this produces, so the scoring must stay as is.

use crate::GrayImageView;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Minimum gradient product for a grid point to be kept (exclusive).
pub const SCORE_THRESHOLD: f32 = 100.0;

/// Distance from the right and bottom edges that the scan never enters.
pub const EDGE_MARGIN: usize = 8;

/// Grid sampling density.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureDensity {
    Low,
    #[default]
    Medium,
    High,
}

impl FeatureDensity {
    pub const ALL: [FeatureDensity; 3] = [Self::Low, Self::Medium, Self::High];

    /// Grid stride in pixels.
    #[inline]
    pub const fn step(self) -> usize {
        match self {
            Self::Low => 20,
            Self::Medium => 10,
            Self::High => 5,
        }
    }

    /// Single-byte code used in the binary feature set header.
    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Low),
            1 => Some(Self::Medium),
            2 => Some(Self::High),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for FeatureDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown density name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownDensity(pub String);

impl fmt::Display for UnknownDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown feature density '{}' (expected low, medium or high)",
            self.0
        )
    }
}

impl std::error::Error for UnknownDensity {}

impl FromStr for FeatureDensity {
    type Err = UnknownDensity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownDensity(s.to_owned()))
    }
}

/// Accepted grid point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeaturePoint {
    pub x: i32,
    pub y: i32,
    /// `|dx| * |dy|`, always above [`SCORE_THRESHOLD`].
    pub score: f32,
}

/// Gradient-product response at `(x, y)`.
///
/// Requires `x + 1 < width` and `y + 1 < height`.
#[inline]
pub fn gradient_product(img: &GrayImageView<'_>, x: usize, y: usize) -> f32 {
    let c = img.get(x, y) as i32;
    let dx = (img.get(x + 1, y) as i32 - c).unsigned_abs();
    let dy = (img.get(x, y + 1) as i32 - c).unsigned_abs();
    // Both factors are <= 255, so the product is exact in f32.
    (dx * dy) as f32
}

/// Scan `img` on a `density.step()` grid and keep every point whose
/// gradient product exceeds [`SCORE_THRESHOLD`].
///
/// Points are returned in row-major scan order. The scan covers
/// `y < height - 8` and `x < width - 8`; images no larger than the margin
/// yield no features.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img), fields(width = img.width, height = img.height))
)]
pub fn extract_features(img: &GrayImageView<'_>, density: FeatureDensity) -> Vec<FeaturePoint> {
    let step = density.step();
    let y_end = img.height.saturating_sub(EDGE_MARGIN);
    let x_end = img.width.saturating_sub(EDGE_MARGIN);

    let mut out = Vec::new();
    for y in (0..y_end).step_by(step) {
        for x in (0..x_end).step_by(step) {
            let score = gradient_product(img, x, y);
            if score > SCORE_THRESHOLD {
                out.push(FeaturePoint {
                    x: x as i32,
                    y: y as i32,
                    score,
                });
            }
        }
    }
    out
}
