//! The classification decision: run the detector once and turn its
//! confidence list into an outcome plus a message.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, RgbImage};
use rand::Rng;

use crate::annotate;
use crate::detect::{ClassificationOutcome, DetectionResult, DetectorBackend};
use crate::error::{DetectError, DetectResult};
use crate::messages::MessagePool;

/// Threshold used by the web UI.
pub const DEFAULT_CONFIDENCE: f32 = 0.45;

/// Output of one classification call.
#[derive(Clone, Debug)]
pub struct Classification {
    pub detections: DetectionResult,
    pub outcome: ClassificationOutcome,
    pub message: String,
    pub annotated: RgbImage,
}

pub struct Classifier {
    backend: Arc<dyn DetectorBackend>,
    messages: MessagePool,
    confidence: f32,
    save_path: Option<PathBuf>,
}

impl Classifier {
    pub fn new(backend: Arc<dyn DetectorBackend>) -> Self {
        Self {
            backend,
            messages: MessagePool::default(),
            confidence: DEFAULT_CONFIDENCE,
            save_path: None,
        }
    }

    pub fn with_messages(mut self, messages: MessagePool) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> DetectResult<Self> {
        validate_confidence(confidence)?;
        self.confidence = confidence;
        Ok(self)
    }

    /// Persist every annotated image to `path` as JPEG.
    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn classify(&self, image: &DynamicImage) -> DetectResult<Classification> {
        self.classify_with(image, self.confidence, &mut rand::thread_rng())
    }

    /// Classify with an explicit threshold and RNG.
    pub fn classify_with<R: Rng + ?Sized>(
        &self,
        image: &DynamicImage,
        confidence: f32,
        rng: &mut R,
    ) -> DetectResult<Classification> {
        validate_confidence(confidence)?;
        let rgb = image.to_rgb8();
        let detections = self
            .backend
            .detect(&rgb, confidence)
            .map_err(DetectError::Model)?;
        let outcome = detections.outcome();
        let message = self.messages.pick(outcome, rng).to_string();
        let annotated = annotate::annotate(&rgb, &detections);

        if let Some(path) = &self.save_path {
            annotate::save_jpeg(&annotated, path).map_err(DetectError::Save)?;
            log::debug!("annotated image saved to {}", path.display());
        }

        log::info!(
            "{} detection(s) at conf >= {:.2} via {}: {}",
            detections.len(),
            confidence,
            self.backend.name(),
            outcome.as_str()
        );

        Ok(Classification {
            detections,
            outcome,
            message,
            annotated,
        })
    }

    /// Decode encoded image bytes and classify them.
    pub fn classify_bytes(&self, bytes: &[u8]) -> DetectResult<Classification> {
        let image = image::load_from_memory(bytes)?;
        self.classify(&image)
    }

    pub fn classify_path(&self, path: &Path) -> DetectResult<Classification> {
        let bytes = std::fs::read(path)?;
        self.classify_bytes(&bytes)
    }
}

fn validate_confidence(confidence: f32) -> DetectResult<()> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(DetectError::InvalidThreshold(confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection, StubBackend};
    use crate::messages::MessageStyle;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn one_box(confidence: f32) -> Arc<dyn DetectorBackend> {
        Arc::new(StubBackend::with_detections(vec![Detection::new(
            BoundingBox::new(2.0, 2.0, 12.0, 12.0),
            confidence,
            0,
        )]))
    }

    fn blank() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([90, 90, 90])))
    }

    #[test]
    fn outcome_follows_detections() {
        let present = Classifier::new(one_box(0.9)).classify(&blank()).unwrap();
        assert_eq!(present.outcome, ClassificationOutcome::Present);
        assert_eq!(present.detections.len(), 1);

        let absent = Classifier::new(Arc::new(StubBackend::new()))
            .classify(&blank())
            .unwrap();
        assert_eq!(absent.outcome, ClassificationOutcome::Absent);
        assert!(absent.detections.is_empty());
    }

    #[test]
    fn threshold_is_forwarded_to_backend() {
        let classifier = Classifier::new(one_box(0.4));
        let mut rng = StdRng::seed_from_u64(3);
        let low = classifier.classify_with(&blank(), 0.3, &mut rng).unwrap();
        let high = classifier.classify_with(&blank(), 0.5, &mut rng).unwrap();
        assert_eq!(low.outcome, ClassificationOutcome::Present);
        assert_eq!(high.outcome, ClassificationOutcome::Absent);
    }

    #[test]
    fn messages_come_from_matching_pool() {
        let classifier = Classifier::new(one_box(0.9));
        let pool = MessagePool::for_style(MessageStyle::Playful);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let c = classifier.classify_with(&blank(), 0.5, &mut rng).unwrap();
            assert!(pool.pool(ClassificationOutcome::Present).contains(&c.message));
        }
    }

    #[test]
    fn plain_messages() {
        let classifier = Classifier::new(Arc::new(StubBackend::new()))
            .with_messages(MessagePool::for_style(MessageStyle::Plain));
        let c = classifier.classify(&blank()).unwrap();
        assert_eq!(c.message, "NO SOLAR PANELS DETECTED");
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let classifier = Classifier::new(one_box(0.9));
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            classifier.classify_with(&blank(), 1.5, &mut rng),
            Err(DetectError::InvalidThreshold(_))
        ));
        assert!(Classifier::new(one_box(0.9)).with_confidence(-0.1).is_err());
    }

    #[test]
    fn undecodable_bytes_are_a_decode_failure() {
        let classifier = Classifier::new(one_box(0.9));
        assert!(matches!(
            classifier.classify_bytes(b"definitely not an image"),
            Err(DetectError::Decode(_))
        ));
    }

    #[test]
    fn annotated_image_keeps_source_dimensions() {
        let c = Classifier::new(one_box(0.9)).classify(&blank()).unwrap();
        assert_eq!(c.annotated.dimensions(), (20, 20));
        assert_ne!(*c.annotated.get_pixel(2, 2), Rgb([90, 90, 90]));
    }
}
