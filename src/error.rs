//! Error types for the detection pipeline.

use thiserror::Error;

/// Failures surfaced by the classification and imagery pipeline.
///
/// Network failures during the imagery fetch never show up here directly:
/// the fetcher logs them and reports absence, which the composed pipeline
/// turns into `ImageryUnavailable`.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no satellite imagery available for '{address}'")]
    ImageryUnavailable { address: String },

    #[error("a Google Maps API key is required")]
    MissingApiKey,

    #[error("confidence threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("detector failed: {0:#}")]
    Model(anyhow::Error),

    #[error("failed to save annotated image: {0:#}")]
    Save(anyhow::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DetectResult<T> = std::result::Result<T, DetectError>;
