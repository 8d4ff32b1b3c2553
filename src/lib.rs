//! Solar Panel Detector
//!
//! Looks for solar panels in satellite imagery. An image either arrives
//! directly or is fetched from a static-map service by street address; a
//! pretrained detector runs on it once, and the result comes back as an
//! annotated image plus a message.
//!
//! # Module Structure
//!
//! - `detect`: detector backend trait, ONNX (tract) and stub backends, result types
//! - `classify`: the classification decision (detections → outcome → message)
//! - `imagery`: static-map request building and download
//! - `pipeline`: fetch-then-classify composition
//! - `api`: web UI and JSON API server
//! - `config`: file + environment configuration, credential file

pub mod annotate;
pub mod api;
pub mod classify;
pub mod config;
pub mod detect;
pub mod error;
pub mod imagery;
pub mod messages;
pub mod pipeline;
pub mod ui;

pub use classify::{Classification, Classifier, DEFAULT_CONFIDENCE};
pub use detect::{
    load_backend, BoundingBox, ClassificationOutcome, Detection, DetectionResult,
    DetectorBackend, StubBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use error::{DetectError, DetectResult};
pub use imagery::{FetchedImage, ImageryClient, ImageryConfig, StaticMapRequest};
pub use messages::{MessagePool, MessageStyle};
pub use pipeline::{AddressClassification, AddressQuery, DetectionService};
