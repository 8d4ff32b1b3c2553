use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionResult};

/// Stub backend for testing. Returns a fixed set of detections for every image.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    detections: Vec<Detection>,
}

impl StubBackend {
    /// A stub that never finds anything.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, _image: &RgbImage, threshold: f32) -> Result<DetectionResult> {
        let kept = self
            .detections
            .iter()
            .filter(|d| d.confidence >= threshold)
            .cloned()
            .collect();
        Ok(DetectionResult::new(kept))
    }
}
