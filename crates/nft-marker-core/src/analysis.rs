//! Brightness / contrast statistics and the trackability verdict.

use crate::GrayImageView;
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Images up to this many pixels are analysed at full resolution.
pub const FULL_RES_PIXEL_LIMIT: usize = 4_000_000;

/// Coarse trackability rating derived from contrast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityVerdict {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityVerdict {
    /// `< 30` poor, `< 60` fair, `< 90` good, otherwise excellent.
    pub fn from_contrast(contrast: f64) -> Self {
        if contrast < 30.0 {
            Self::Poor
        } else if contrast < 60.0 {
            Self::Fair
        } else if contrast < 90.0 {
            Self::Good
        } else {
            Self::Excellent
        }
    }

    /// Poor and fair images track unreliably.
    #[inline]
    pub fn is_low(self) -> bool {
        self <= Self::Fair
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }
}

impl fmt::Display for QualityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grayscale statistics of one image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Mean intensity in `[0, 255]`.
    pub average_brightness: f64,
    /// Population standard deviation of intensity.
    pub contrast: f64,
    pub quality_verdict: QualityVerdict,
}

impl AnalysisResult {
    /// Contrast normalised against the "excellent" threshold, in `[0, 1]`.
    pub fn quality_score(&self) -> f32 {
        (self.contrast / 90.0).clamp(0.0, 1.0) as f32
    }
}

/// Sampling stride used for an image of the given size.
///
/// Depends on the dimensions only, so a given image is always sampled the
/// same way.
pub fn sample_stride(width: usize, height: usize) -> usize {
    let pixels = width.saturating_mul(height);
    if pixels <= FULL_RES_PIXEL_LIMIT {
        return 1;
    }
    let ratio = pixels as f64 / FULL_RES_PIXEL_LIMIT as f64;
    ratio.sqrt().ceil() as usize
}

/// Compute mean and standard deviation over a stride-sampled grid.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img), fields(width = img.width, height = img.height))
)]
pub fn analyze_gray(img: &GrayImageView<'_>) -> AnalysisResult {
    let stride = sample_stride(img.width, img.height);

    // Integer histogram keeps the result independent of summation order.
    let mut hist = [0u64; 256];
    for y in (0..img.height).step_by(stride) {
        let row = img.row(y);
        for x in (0..img.width).step_by(stride) {
            hist[row[x] as usize] += 1;
        }
    }

    let n: u64 = hist.iter().sum();
    if n == 0 {
        return AnalysisResult {
            average_brightness: 0.0,
            contrast: 0.0,
            quality_verdict: QualityVerdict::Poor,
        };
    }

    let sum: u64 = hist.iter().enumerate().map(|(v, &c)| v as u64 * c).sum();
    let sum_sq: u64 = hist
        .iter()
        .enumerate()
        .map(|(v, &c)| (v * v) as u64 * c)
        .sum();

    let n = n as f64;
    let mean = sum as f64 / n;
    let variance = (sum_sq as f64 / n - mean * mean).max(0.0);
    let contrast = variance.sqrt();

    AnalysisResult {
        average_brightness: mean,
        contrast,
        quality_verdict: QualityVerdict::from_contrast(contrast),
    }
}
