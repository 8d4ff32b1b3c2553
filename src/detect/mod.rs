mod backend;
mod backends;
mod result;
pub mod yolo;

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, ClassificationOutcome, Detection, DetectionResult};

/// Load the backend named in the settings and hand it out as a shared handle.
pub fn load_backend(settings: &DetectorSettings) -> Result<Arc<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => Ok(Arc::new(StubBackend::new())),
        #[cfg(feature = "backend-tract")]
        "tract" => {
            let backend = TractBackend::new(&settings.model_path, settings.input_size)?
                .with_iou_threshold(settings.iou_threshold);
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "backend-tract"))]
        "tract" => Err(anyhow!(
            "backend 'tract' requires building with the backend-tract feature"
        )),
        other => Err(anyhow!(
            "unknown detector backend '{}'; expected tract or stub",
            other
        )),
    }
}
