use anyhow::Result;
use image::RgbImage;

use crate::detect::result::DetectionResult;

/// Detector backend trait.
///
/// A backend wraps one loaded model. It is created once at startup and then
/// shared read-only across requests, so `detect` takes `&self` and
/// implementations must be `Send + Sync`.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on an RGB image.
    ///
    /// Only regions scoring at or above `threshold` are returned. Box
    /// coordinates are in the pixel space of `image`.
    fn detect(&self, image: &RgbImage, threshold: f32) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
