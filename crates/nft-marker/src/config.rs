//! Per-call marker generation settings.

use nft_marker_core::{FeatureDensity, MAX_PYRAMID_LEVELS};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Smallest accepted width and height, in pixels.
pub const MIN_IMAGE_SIDE: u32 = 480;

/// DPI assumed for the source image when nothing else is known.
pub const DEFAULT_SOURCE_DPI: f32 = 72.0;

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// A [`MarkerConfig`] that violates its invariants.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("min_dpi ({min}) must not exceed max_dpi ({max})")]
    DpiRange { min: f32, max: f32 },
    #[error("{field} must be a positive finite number (got {value})")]
    NotPositive { field: &'static str, value: f64 },
    #[error("pyramid_levels must be in 1..={max} (got {got})")]
    PyramidLevels { got: u8, max: u8 },
    #[error("max_image_size ({max}) is below the minimum side of {min} px")]
    MaxSizeBelowMinimum { max: u32, min: u32 },
}

/// Marker generation parameters.
///
/// Missing JSON fields fall back to [`MarkerConfig::default`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Lower bound for the DPI written into the artifacts.
    pub min_dpi: f32,
    /// Upper bound for the DPI written into the artifacts.
    pub max_dpi: f32,
    /// Print resolution assumed for the source; clamped into
    /// `[min_dpi, max_dpi]` to give the target DPI.
    pub source_dpi: f32,
    /// Number of pyramid levels in the multi-scale set, `1..=3`.
    pub pyramid_levels: u8,
    pub feature_density: FeatureDensity,
    /// Stretch contrast before extraction when the image rates poor or fair.
    pub auto_enhance_contrast: bool,
    /// Stretch factor used by `auto_enhance_contrast`.
    pub contrast_factor: f32,
    /// Maximum width and height, in pixels.
    pub max_image_size: u32,
    /// Maximum `width * height`.
    pub max_image_area: u64,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            min_dpi: 72.0,
            max_dpi: 300.0,
            source_dpi: DEFAULT_SOURCE_DPI,
            pyramid_levels: MAX_PYRAMID_LEVELS,
            feature_density: FeatureDensity::Medium,
            auto_enhance_contrast: false,
            contrast_factor: 1.5,
            max_image_size: 8192,
            max_image_area: 50_000_000,
        }
    }
}

impl MarkerConfig {
    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("min_dpi", self.min_dpi),
            ("max_dpi", self.max_dpi),
            ("source_dpi", self.source_dpi),
            ("contrast_factor", self.contrast_factor),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NotPositive {
                    field,
                    value: value as f64,
                });
            }
        }
        if self.min_dpi > self.max_dpi {
            return Err(ConfigError::DpiRange {
                min: self.min_dpi,
                max: self.max_dpi,
            });
        }
        if !(1..=MAX_PYRAMID_LEVELS).contains(&self.pyramid_levels) {
            return Err(ConfigError::PyramidLevels {
                got: self.pyramid_levels,
                max: MAX_PYRAMID_LEVELS,
            });
        }
        if self.max_image_size < MIN_IMAGE_SIDE {
            return Err(ConfigError::MaxSizeBelowMinimum {
                max: self.max_image_size,
                min: MIN_IMAGE_SIDE,
            });
        }
        if self.max_image_area == 0 {
            return Err(ConfigError::NotPositive {
                field: "max_image_area",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// DPI written into the artifacts.
    pub fn target_dpi(&self) -> f32 {
        self.source_dpi.clamp(self.min_dpi, self.max_dpi)
    }

    /// Load a JSON config from disk and validate it.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
