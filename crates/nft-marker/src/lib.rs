//! Natural-feature marker generation for image-tracking AR.
//!
//! This crate provides:
//! - stable re-exports of the pixel algorithms ([`core`]) and the analysis
//!   cache ([`cache`])
//! - an end-to-end [`MarkerGenerator`] that validates a source image,
//!   analyzes it through the cache, extracts grid corner features over an
//!   image pyramid, encodes the `.fset` / `.fset3` / `.iset` artifacts and
//!   publishes them atomically under `{storage_root}/nft_markers/{id}/`.
//!
//! ## Quickstart
//!
//! ```no_run
//! use nft_marker::{generate_marker, MarkerConfig, MarkerSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MarkerConfig::default();
//! let result = generate_marker(
//!     "/var/lib/markers",
//!     &MarkerSource::path("poster.jpg"),
//!     "poster",
//!     &config,
//! )?;
//! println!(
//!     "{} features, quality {:.2}",
//!     result.total_features(),
//!     result.quality_score
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `nft_marker::core`: gray images, statistics, corner extractor, pyramid.
//! - `nft_marker::cache`: `Cache` trait, fingerprints, JSON-file and memory stores.
//! - `nft_marker::codec`: artifact encoders and decoders.
//! - `nft_marker::publish`: staging / backup / rename publishing.

pub use nft_marker_cache as cache;
pub use nft_marker_core as core;

pub use nft_marker_core::{AnalysisResult, FeatureDensity, FeaturePoint, QualityVerdict};

mod analyzer;
pub mod codec;
mod config;
mod error;
pub mod metrics;
mod pipeline;
pub mod publish;
pub mod validate;

pub use analyzer::FeatureAnalyzer;
pub use config::{ConfigError, ConfigIoError, MarkerConfig, DEFAULT_SOURCE_DPI, MIN_IMAGE_SIDE};
pub use error::MarkerError;
pub use metrics::{CounterMetrics, MetricsSink, NoopMetrics};
pub use pipeline::{
    generate_marker, gray_view, GenerationResult, GenerationWarning, MarkerGenerator,
    MarkerSource, PipelineStage, FEW_FEATURES_THRESHOLD,
};
pub use publish::{MarkerArtifact, PublishError, PublishFs, StdFs};
