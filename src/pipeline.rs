//! Fetch-then-classify composition used by the CLI and the web server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::classify::{Classification, Classifier};
use crate::config::AppConfig;
use crate::detect::DetectorBackend;
use crate::error::{DetectError, DetectResult};
use crate::imagery::{FetchedImage, ImageryClient, StaticMapRequest};
use crate::messages::MessagePool;

/// Address-based detection request.
#[derive(Clone, Debug)]
pub struct AddressQuery {
    pub address: String,
    /// Per-request key; falls back to the configured one when absent.
    pub api_key: Option<String>,
    pub zoom: Option<u8>,
}

/// Classification of fetched imagery, with the download it came from.
#[derive(Clone, Debug)]
pub struct AddressClassification {
    pub classification: Classification,
    pub image_path: PathBuf,
}

pub struct DetectionService {
    classifier: Classifier,
    imagery: ImageryClient,
    default_api_key: Option<String>,
    default_zoom: u8,
    size: String,
}

impl DetectionService {
    pub fn new(
        classifier: Classifier,
        imagery: ImageryClient,
        default_api_key: Option<String>,
        default_zoom: u8,
        size: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            imagery,
            default_api_key,
            default_zoom,
            size: size.into(),
        }
    }

    /// Wire up a service from loaded configuration and an initialized backend.
    pub fn from_config(cfg: &AppConfig, backend: Arc<dyn DetectorBackend>) -> Result<Self> {
        let mut classifier = Classifier::new(backend)
            .with_messages(MessagePool::for_style(cfg.output.messages))
            .with_confidence(cfg.detector.confidence)?;
        if cfg.output.save_annotated {
            classifier = classifier.with_save_path(&cfg.output.annotated_path);
        }
        Ok(Self::new(
            classifier,
            ImageryClient::new(cfg.imagery.client_config()),
            cfg.api_key.clone(),
            cfg.imagery.zoom,
            cfg.imagery.size.clone(),
        ))
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn has_default_api_key(&self) -> bool {
        self.default_api_key.is_some()
    }

    /// Build the static-map request, resolving the API key and zoom defaults.
    pub fn map_request(&self, query: &AddressQuery) -> DetectResult<StaticMapRequest> {
        let api_key = query
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .or_else(|| self.default_api_key.clone())
            .ok_or(DetectError::MissingApiKey)?;
        Ok(
            StaticMapRequest::new(query.address.trim(), api_key)
                .with_zoom(query.zoom.unwrap_or(self.default_zoom))
                .with_size(self.size.clone()),
        )
    }

    /// Fetch imagery for the address. `Ok(None)` when it is not available.
    pub fn fetch(&self, query: &AddressQuery) -> DetectResult<Option<FetchedImage>> {
        let request = self.map_request(query)?;
        self.imagery.fetch(&request)
    }

    /// Fetch imagery for the address and classify it.
    pub fn detect_address(&self, query: &AddressQuery) -> DetectResult<AddressClassification> {
        let fetched = self
            .fetch(query)?
            .ok_or_else(|| DetectError::ImageryUnavailable {
                address: query.address.trim().to_string(),
            })?;
        let classification = self.classifier.classify_bytes(&fetched.bytes)?;
        Ok(AddressClassification {
            classification,
            image_path: fetched.path,
        })
    }

    pub fn detect_bytes(&self, bytes: &[u8]) -> DetectResult<Classification> {
        self.classifier.classify_bytes(bytes)
    }
}
