//! Pixel-level building blocks for natural-feature markers.
//!
//! This crate is intentionally small and free of I/O. It does *not* depend
//! on any image codec: callers hand in 8-bit grayscale buffers through
//! [`GrayImageView`].
//!
//! - [`analyze_gray`]: brightness / contrast statistics and a [`QualityVerdict`].
//! - [`extract_features`]: grid-sampled gradient-product corner features.
//! - [`multiscale_features`]: the same extractor over a 2× pyramid.

mod analysis;
mod features;
mod image;
mod logger;
mod pyramid;

pub use analysis::{
    analyze_gray, sample_stride, AnalysisResult, QualityVerdict, FULL_RES_PIXEL_LIMIT,
};
pub use features::{
    extract_features, gradient_product, FeatureDensity, FeaturePoint, UnknownDensity,
    EDGE_MARGIN, SCORE_THRESHOLD,
};
pub use image::{downsample_2x, enhance_contrast, GrayImage, GrayImageView};
pub use pyramid::{
    build_pyramid, extract_pyramid_features, multiscale_features, LevelFeatures,
    MultiScaleFeatures, Pyramid, PyramidLevel, MAX_PYRAMID_LEVELS,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_for_verbosity};
