//! Marker generation state machine:
//! `Validating -> Analyzing -> Extracting -> Encoding -> Publishing -> Done`.

use crate::analyzer::FeatureAnalyzer;
use crate::codec::{encode_feature_set, encode_image_set, encode_multiscale_set};
use crate::config::MarkerConfig;
use crate::metrics::{
    MetricsSink, NoopMetrics, GENERATION_COUNT, GENERATION_FAILED, GENERATION_TIME_MS,
};
use crate::publish::{ArtifactBytes, MarkerArtifact, PublishFs, Publisher, StdFs};
use crate::validate::{decode_validated, validate_marker_id, validate_view_dimensions};
use crate::MarkerError;
use nft_marker_cache::{Cache, Fingerprint, JsonFileCache};
use nft_marker_core::{
    enhance_contrast, multiscale_features, AnalysisResult, GrayImageView, MultiScaleFeatures,
    QualityVerdict,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Fewer level-0 features than this yields [`GenerationWarning::FewFeatures`].
pub const FEW_FEATURES_THRESHOLD: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Validating,
    Analyzing,
    Extracting,
    Encoding,
    Publishing,
    Done,
    Failed,
}

impl PipelineStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Analyzing => "analyzing",
            Self::Extracting => "extracting",
            Self::Encoding => "encoding",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the source image comes from.
#[derive(Clone, Debug)]
pub enum MarkerSource {
    /// Image file; fingerprinted by path, modification time and size.
    Path(PathBuf),
    /// In-memory image; fingerprinted by `reference` and a content digest.
    /// `reference` is also what the `.iset` records as the source.
    Bytes { data: Vec<u8>, reference: String },
}

impl MarkerSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes(data: impl Into<Vec<u8>>, reference: impl Into<String>) -> Self {
        Self::Bytes {
            data: data.into(),
            reference: reference.into(),
        }
    }

    /// Reference written into the image/metadata set.
    pub fn reference(&self) -> String {
        match self {
            Self::Path(path) => path.to_string_lossy().into_owned(),
            Self::Bytes { reference, .. } => reference.clone(),
        }
    }

    fn load(&self) -> Result<(Vec<u8>, Fingerprint), MarkerError> {
        match self {
            Self::Path(path) => {
                let read_err = |source| MarkerError::SourceRead {
                    path: path.clone(),
                    source,
                };
                let fingerprint = Fingerprint::for_file(path).map_err(read_err)?;
                let data = std::fs::read(path).map_err(read_err)?;
                Ok((data, fingerprint))
            }
            Self::Bytes { data, reference } => {
                Ok((data.clone(), Fingerprint::for_bytes(reference, data)))
            }
        }
    }
}

/// Advisory findings; generation still succeeds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationWarning {
    /// The image rated poor or fair; tracking may be unreliable.
    LowQuality {
        verdict: QualityVerdict,
        contrast: f64,
    },
    /// The full-resolution pass found few feature points.
    FewFeatures { count: usize, minimum: usize },
}

impl fmt::Display for GenerationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowQuality { verdict, contrast } => {
                write!(f, "low image quality: {verdict} (contrast {contrast:.1})")
            }
            Self::FewFeatures { count, minimum } => {
                write!(f, "only {count} feature points (recommended at least {minimum})")
            }
        }
    }
}

/// Outcome of one successful generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub marker_id: String,
    pub artifact: MarkerArtifact,
    /// Statistics of the source image (before any contrast enhancement).
    pub analysis: AnalysisResult,
    /// `min(contrast / 90, 1)`.
    pub quality_score: f32,
    pub generation_time: Duration,
    pub feature_counts_per_level: Vec<usize>,
    pub target_dpi: f32,
    /// Extraction ran on a contrast-stretched copy.
    pub contrast_enhanced: bool,
    pub warnings: Vec<GenerationWarning>,
}

impl GenerationResult {
    pub fn total_features(&self) -> usize {
        self.feature_counts_per_level.iter().sum()
    }

    pub fn is_low_quality(&self) -> bool {
        self.analysis.quality_verdict.is_low()
    }
}

/// Convert an `image::GrayImage` into the lightweight core view type.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Generates markers under one storage root.
///
/// Cheap to share behind an `Arc`; concurrent calls for different marker ids
/// only contend on the analysis cache. Regenerating the same id concurrently
/// must be serialized by the caller.
pub struct MarkerGenerator {
    storage_root: PathBuf,
    cache: Arc<dyn Cache<Fingerprint, AnalysisResult>>,
    metrics: Arc<dyn MetricsSink>,
    publisher: Publisher,
}

impl fmt::Debug for MarkerGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerGenerator")
            .field("storage_root", &self.storage_root)
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl MarkerGenerator {
    /// JSON-file cache under `{storage_root}/nft_cache`, no metrics, real
    /// filesystem.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        let storage_root = storage_root.into();
        let cache = JsonFileCache::<AnalysisResult>::under_storage_root(&storage_root);
        Self {
            publisher: Publisher::new(&storage_root, Arc::new(StdFs)),
            cache: Arc::new(cache),
            metrics: Arc::new(NoopMetrics),
            storage_root,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache<Fingerprint, AnalysisResult>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn PublishFs>) -> Self {
        self.publisher = Publisher::new(&self.storage_root, fs);
        self
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Where marker `id` is (or would be) published.
    pub fn locate(&self, id: &str) -> MarkerArtifact {
        self.publisher.locate(id)
    }

    /// Validate, analyze, extract, encode and publish one marker.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, source, config), fields(marker_id = %marker_id))
    )]
    pub fn generate_marker(
        &self,
        source: &MarkerSource,
        marker_id: &str,
        config: &MarkerConfig,
    ) -> Result<GenerationResult, MarkerError> {
        let started = Instant::now();
        let outcome = self.run_source(source, marker_id, config, started);
        self.record(marker_id, started, outcome)
    }

    /// Same as [`Self::generate_marker`] for an already decoded image.
    ///
    /// Dimension limits still apply. `source_ref` goes into the `.iset`.
    pub fn generate_from_gray(
        &self,
        img: &GrayImageView<'_>,
        fingerprint: &Fingerprint,
        source_ref: &str,
        marker_id: &str,
        config: &MarkerConfig,
    ) -> Result<GenerationResult, MarkerError> {
        let started = Instant::now();
        let outcome = self
            .validate(marker_id, config)
            .and_then(|()| {
                validate_view_dimensions(img.width, img.height, config)?;
                self.produce(img, fingerprint, source_ref, marker_id, config, started)
            });
        self.record(marker_id, started, outcome)
    }

    /// Delete a published marker. Returns `false` when there was none.
    pub fn remove_marker(&self, marker_id: &str) -> Result<bool, MarkerError> {
        validate_marker_id(marker_id)?;
        let removed = self.publisher.remove(marker_id)?;
        if removed {
            log::info!("removed marker {marker_id}");
        }
        Ok(removed)
    }

    fn validate(&self, marker_id: &str, config: &MarkerConfig) -> Result<(), MarkerError> {
        enter(marker_id, PipelineStage::Validating);
        validate_marker_id(marker_id)?;
        config.validate()?;
        Ok(())
    }

    fn run_source(
        &self,
        source: &MarkerSource,
        marker_id: &str,
        config: &MarkerConfig,
        started: Instant,
    ) -> Result<GenerationResult, MarkerError> {
        self.validate(marker_id, config)?;
        let (data, fingerprint) = source.load()?;
        let img = decode_validated(&data, config)?;
        drop(data);
        let reference = source.reference();
        self.produce(&gray_view(&img), &fingerprint, &reference, marker_id, config, started)
    }

    /// Everything after validation.
    fn produce(
        &self,
        img: &GrayImageView<'_>,
        fingerprint: &Fingerprint,
        source_ref: &str,
        marker_id: &str,
        config: &MarkerConfig,
        started: Instant,
    ) -> Result<GenerationResult, MarkerError> {
        enter(marker_id, PipelineStage::Analyzing);
        let analyzer = FeatureAnalyzer::new(Arc::clone(&self.cache), Arc::clone(&self.metrics));
        let analysis = analyzer.analyze(fingerprint, img);
        let mut warnings = Vec::new();
        if analysis.quality_verdict.is_low() {
            log::warn!(
                "{marker_id}: {} image quality (contrast {:.1})",
                analysis.quality_verdict,
                analysis.contrast
            );
            warnings.push(GenerationWarning::LowQuality {
                verdict: analysis.quality_verdict,
                contrast: analysis.contrast,
            });
        }

        enter(marker_id, PipelineStage::Extracting);
        let enhanced = (config.auto_enhance_contrast && analysis.quality_verdict.is_low()).then(
            || {
                log::debug!(
                    "{marker_id}: stretching contrast by {} around {:.1}",
                    config.contrast_factor,
                    analysis.average_brightness
                );
                enhance_contrast(
                    img,
                    analysis.average_brightness,
                    f64::from(config.contrast_factor),
                )
            },
        );
        let view = enhanced.as_ref().map_or(*img, |e| e.view());
        let features = multiscale_features(&view, config.pyramid_levels, config.feature_density);
        let base_count = features.base().map_or(0, |l| l.points.len());
        if base_count < FEW_FEATURES_THRESHOLD {
            log::warn!("{marker_id}: only {base_count} feature points at full resolution");
            warnings.push(GenerationWarning::FewFeatures {
                count: base_count,
                minimum: FEW_FEATURES_THRESHOLD,
            });
        }

        enter(marker_id, PipelineStage::Encoding);
        let target_dpi = config.target_dpi();
        let bytes = encode_artifacts(img, &features, target_dpi, config, source_ref)?;

        enter(marker_id, PipelineStage::Publishing);
        let artifact = self.publisher.publish(marker_id, &bytes)?;

        let result = GenerationResult {
            marker_id: marker_id.to_owned(),
            artifact,
            analysis,
            quality_score: analysis.quality_score(),
            generation_time: started.elapsed(),
            feature_counts_per_level: features.counts(),
            target_dpi,
            contrast_enhanced: enhanced.is_some(),
            warnings,
        };
        enter(marker_id, PipelineStage::Done);
        Ok(result)
    }

    fn record(
        &self,
        marker_id: &str,
        started: Instant,
        outcome: Result<GenerationResult, MarkerError>,
    ) -> Result<GenerationResult, MarkerError> {
        match &outcome {
            Ok(result) => {
                self.metrics.increment(GENERATION_COUNT);
                let ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                self.metrics.add(GENERATION_TIME_MS, ms);
                log::info!(
                    "generated marker {marker_id}: {} features over {} levels, quality {:.2} in {} ms",
                    result.total_features(),
                    result.feature_counts_per_level.len(),
                    result.quality_score,
                    ms
                );
            }
            Err(e) => {
                self.metrics.increment(GENERATION_FAILED);
                log::debug!("{marker_id}: {}", PipelineStage::Failed);
                log::warn!("marker {marker_id} failed while {}: {e}", e.stage());
            }
        }
        outcome
    }
}

fn enter(marker_id: &str, stage: PipelineStage) {
    log::debug!("{marker_id}: {stage}");
}

fn encode_artifacts(
    img: &GrayImageView<'_>,
    features: &MultiScaleFeatures,
    target_dpi: f32,
    config: &MarkerConfig,
    source_ref: &str,
) -> Result<ArtifactBytes, MarkerError> {
    let base = features.base().map_or(&[][..], |l| l.points.as_slice());
    Ok(ArtifactBytes {
        feature_set: encode_feature_set(
            img.width,
            img.height,
            target_dpi,
            config.feature_density,
            base,
        )?,
        multiscale_feature_set: encode_multiscale_set(features)?,
        image_metadata_set: encode_image_set(
            img.width,
            img.height,
            target_dpi,
            features.total(),
            source_ref,
        )?,
    })
}

/// One-shot generation with the default JSON-file cache and no metrics.
pub fn generate_marker(
    storage_root: impl Into<PathBuf>,
    source: &MarkerSource,
    marker_id: &str,
    config: &MarkerConfig,
) -> Result<GenerationResult, MarkerError> {
    MarkerGenerator::new(storage_root).generate_marker(source, marker_id, config)
}
