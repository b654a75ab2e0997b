use crate::codec::EncodeError;
use crate::config::ConfigError;
use crate::publish::PublishError;
use crate::PipelineStage;
use std::path::PathBuf;

/// Errors returned by [`crate::generate_marker`] and [`crate::MarkerGenerator`].
///
/// Low image quality is never an error; see [`crate::GenerationWarning`].
#[derive(thiserror::Error, Debug)]
pub enum MarkerError {
    #[error("invalid marker id {id:?}: {reason}")]
    InvalidMarkerId { id: String, reason: &'static str },

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("failed to read source image {path}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image")]
    Decode(#[source] image::ImageError),

    #[error("image too small: {width}x{height} (minimum {min}x{min})")]
    TooSmall { width: u32, height: u32, min: u32 },

    #[error("image too large: {width}x{height} (maximum side {max})")]
    TooLarge { width: u32, height: u32, max: u32 },

    #[error("image area exceeded: {width}x{height} = {area} px (maximum {max_area})")]
    AreaExceeded {
        width: u32,
        height: u32,
        area: u64,
        max_area: u64,
    },

    #[error("failed to encode marker artifacts")]
    Encoding(#[from] EncodeError),

    #[error("failed to publish marker artifacts")]
    Publish(#[from] PublishError),
}

impl MarkerError {
    /// Pipeline stage that produced the error.
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::InvalidMarkerId { .. }
            | Self::InvalidConfig(_)
            | Self::SourceRead { .. }
            | Self::Decode(_)
            | Self::TooSmall { .. }
            | Self::TooLarge { .. }
            | Self::AreaExceeded { .. } => PipelineStage::Validating,
            Self::Encoding(_) => PipelineStage::Encoding,
            Self::Publish(_) => PipelineStage::Publishing,
        }
    }

    /// `true` for rejections of the input image itself.
    pub fn is_validation(&self) -> bool {
        self.stage() == PipelineStage::Validating
    }
}
