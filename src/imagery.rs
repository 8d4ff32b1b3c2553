//! Static satellite imagery fetcher.
//!
//! Builds a static-map request for an address and downloads the image in a
//! single best-effort attempt. Transport errors and non-200 responses are
//! logged and reported as `None`; there is no retry.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::error::{DetectError, DetectResult};

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/staticmap";
pub const DEFAULT_ZOOM: u8 = 18;
pub const DEFAULT_SIZE: &str = "640x640";
pub const MAX_ZOOM: u8 = 22;

const MAP_TYPE: &str = "satellite";
const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// One static-map request.
#[derive(Clone, Debug)]
pub struct StaticMapRequest {
    pub address: String,
    pub api_key: String,
    pub zoom: u8,
    pub size: String,
}

impl StaticMapRequest {
    pub fn new(address: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            api_key: api_key.into(),
            zoom: DEFAULT_ZOOM,
            size: DEFAULT_SIZE.to_string(),
        }
    }

    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn validate(&self) -> DetectResult<()> {
        if self.address.trim().is_empty() {
            return Err(DetectError::InvalidRequest("address is empty".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(DetectError::MissingApiKey);
        }
        if self.zoom > MAX_ZOOM {
            return Err(DetectError::InvalidRequest(format!(
                "zoom {} is above the maximum of {}",
                self.zoom, MAX_ZOOM
            )));
        }
        parse_size(&self.size)?;
        Ok(())
    }

    /// Query parameters in the order the endpoint documents them.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("center", self.address.clone()),
            ("zoom", self.zoom.to_string()),
            ("size", self.size.clone()),
            ("maptype", MAP_TYPE.to_string()),
            ("key", self.api_key.clone()),
        ]
    }

    /// File name for the downloaded image: the last two words of the address
    /// joined by `_`, with path-unsafe characters replaced.
    pub fn file_name(&self) -> String {
        let words: Vec<&str> = self.address.split_whitespace().collect();
        let tail = &words[words.len().saturating_sub(2)..];
        let stem = unsafe_chars().replace_all(&tail.join("_"), "_").into_owned();
        if stem.is_empty() {
            "imagery.jpg".to_string()
        } else {
            format!("{stem}.jpg")
        }
    }
}

/// Image bytes downloaded for a request, plus where they were written.
#[derive(Clone, Debug)]
pub struct FetchedImage {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct ImageryConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub download_dir: PathBuf,
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            download_dir: PathBuf::from("."),
        }
    }
}

pub struct ImageryClient {
    cfg: ImageryConfig,
    agent: ureq::Agent,
}

impl ImageryClient {
    pub fn new(cfg: ImageryConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(cfg.timeout).build();
        Self { cfg, agent }
    }

    pub fn request_url(&self, request: &StaticMapRequest) -> DetectResult<Url> {
        Url::parse_with_params(&self.cfg.base_url, request.query_params()).map_err(|e| {
            DetectError::InvalidRequest(format!(
                "invalid imagery base url '{}': {}",
                self.cfg.base_url, e
            ))
        })
    }

    /// Fetch imagery for `request`.
    ///
    /// `Ok(None)` means the imagery is not available: the request failed in
    /// transport or the endpoint answered with something other than 200.
    /// Invalid requests and local write failures are errors.
    pub fn fetch(&self, request: &StaticMapRequest) -> DetectResult<Option<FetchedImage>> {
        request.validate()?;
        let url = self.request_url(request)?;

        let response = match self.agent.request_url("GET", &url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                log::warn!(
                    "imagery request for '{}' failed with status {}",
                    request.address,
                    code
                );
                return Ok(None);
            }
            Err(ureq::Error::Transport(err)) => {
                log::warn!("imagery request for '{}' failed: {}", request.address, err);
                return Ok(None);
            }
        };
        if response.status() != 200 {
            log::warn!(
                "imagery request for '{}' returned status {}",
                request.address,
                response.status()
            );
            return Ok(None);
        }

        let mut bytes = Vec::new();
        if let Err(err) = response
            .into_reader()
            .take(MAX_IMAGE_BYTES)
            .read_to_end(&mut bytes)
        {
            log::warn!(
                "reading imagery body for '{}' failed: {}",
                request.address,
                err
            );
            return Ok(None);
        }
        if bytes.is_empty() {
            log::warn!("imagery for '{}' was empty", request.address);
            return Ok(None);
        }

        let path = self.cfg.download_dir.join(request.file_name());
        write_image(&path, &bytes)?;
        log::info!(
            "imagery for '{}' downloaded to {} ({} bytes)",
            request.address,
            path.display(),
            bytes.len()
        );
        Ok(Some(FetchedImage { path, bytes }))
    }
}

fn write_image(path: &Path, bytes: &[u8]) -> DetectResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Parse a `<width>x<height>` size string.
pub fn parse_size(size: &str) -> DetectResult<(u32, u32)> {
    let invalid = || DetectError::InvalidRequest(format!("size '{}' is not <width>x<height>", size));
    let caps = size_pattern().captures(size.trim()).ok_or_else(invalid)?;
    let width: u32 = caps[1].parse().map_err(|_| invalid())?;
    let height: u32 = caps[2].parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

fn size_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{1,5})x(\d{1,5})$").expect("valid size regex"))
}

fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w,.\-]").expect("valid file name regex"))
}
