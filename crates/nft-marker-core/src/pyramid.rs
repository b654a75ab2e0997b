//! Power-of-two image pyramid with per-level feature sets.

use crate::features::{extract_features, FeatureDensity, FeaturePoint};
use crate::image::downsample_2x;
use crate::{GrayImage, GrayImageView};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Largest number of levels a marker carries.
pub const MAX_PYRAMID_LEVELS: u8 = 3;

/// One down-scaled copy of the base image. `scale` is the integer divisor
/// relative to the base (2, 4, ...).
#[derive(Clone, Debug)]
pub struct PyramidLevel {
    pub level: u8,
    pub scale: u32,
    pub img: GrayImage,
}

/// Level 0 borrows the caller's image; only the coarser levels are owned.
#[derive(Clone, Debug)]
pub struct Pyramid<'a> {
    pub base: GrayImageView<'a>,
    pub coarser: Vec<PyramidLevel>,
}

impl Pyramid<'_> {
    pub fn len(&self) -> usize {
        1 + self.coarser.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// `(level, scale, view)` for every level, finest first.
    pub fn views(&self) -> Vec<(u8, u32, GrayImageView<'_>)> {
        let mut views = Vec::with_capacity(self.len());
        views.push((0, 1, self.base));
        views.extend(self.coarser.iter().map(|l| (l.level, l.scale, l.img.view())));
        views
    }
}

/// Feature points found on one pyramid level, in that level's pixel space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelFeatures {
    pub level: u8,
    pub scale: u32,
    pub width: u32,
    pub height: u32,
    pub points: Vec<FeaturePoint>,
}

/// Per-level feature sets, coarsest last.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiScaleFeatures {
    pub levels: Vec<LevelFeatures>,
}

impl MultiScaleFeatures {
    /// The full-resolution pass.
    pub fn base(&self) -> Option<&LevelFeatures> {
        self.levels.first()
    }

    pub fn counts(&self) -> Vec<usize> {
        self.levels.iter().map(|l| l.points.len()).collect()
    }

    pub fn total(&self) -> usize {
        self.levels.iter().map(|l| l.points.len()).sum()
    }
}

/// Build a pyramid of `num_levels` levels by repeated 2× box down-sampling.
///
/// `num_levels` is clamped to `1..=MAX_PYRAMID_LEVELS`. Level `k` has scale
/// `2^k` and is derived from level `k - 1`.
pub fn build_pyramid<'a>(base: &GrayImageView<'a>, num_levels: u8) -> Pyramid<'a> {
    let num_levels = num_levels.clamp(1, MAX_PYRAMID_LEVELS);
    let mut coarser: Vec<PyramidLevel> = Vec::with_capacity(num_levels as usize - 1);

    for level in 1..num_levels {
        let img = match coarser.last() {
            Some(prev) => downsample_2x(&prev.img.view()),
            None => downsample_2x(base),
        };
        coarser.push(PyramidLevel {
            level,
            scale: 1u32 << level,
            img,
        });
    }

    Pyramid {
        base: *base,
        coarser,
    }
}

/// Run the extractor on every pyramid level.
pub fn extract_pyramid_features(pyramid: &Pyramid<'_>, density: FeatureDensity) -> MultiScaleFeatures {
    let levels = pyramid
        .views()
        .into_iter()
        .map(|(level, scale, view)| LevelFeatures {
            level,
            scale,
            width: view.width as u32,
            height: view.height as u32,
            points: extract_features(&view, density),
        })
        .collect();
    MultiScaleFeatures { levels }
}

/// Build the pyramid and extract features on each level.
///
/// Level 0 is computed on `base` itself, so its points are exactly what
/// [`extract_features`] returns for the full-resolution image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(base), fields(width = base.width, height = base.height))
)]
pub fn multiscale_features(
    base: &GrayImageView<'_>,
    num_levels: u8,
    density: FeatureDensity,
) -> MultiScaleFeatures {
    let pyramid = build_pyramid(base, num_levels);
    extract_pyramid_features(&pyramid, density)
}
