use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::DEFAULT_CONFIDENCE;
use crate::imagery::{self, ImageryConfig};
use crate::messages::MessageStyle;

const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:7860";
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "detector.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU: f32 = 0.7;
const DEFAULT_IMAGERY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SECRET_PATH: &str = "secret.json";
const DEFAULT_ANNOTATED_PATH: &str = "results.jpg";

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    server: Option<ServerConfigFile>,
    detector: Option<DetectorConfigFile>,
    imagery: Option<ImageryConfigFile>,
    output: Option<OutputConfigFile>,
    samples_dir: Option<PathBuf>,
    secret_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence: Option<f32>,
    iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ImageryConfigFile {
    base_url: Option<String>,
    zoom: Option<u8>,
    size: Option<String>,
    timeout_secs: Option<u64>,
    download_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    save_annotated: Option<bool>,
    annotated_path: Option<PathBuf>,
    messages: Option<String>,
}

/// Shape of the local credential file.
#[derive(Debug, Deserialize)]
struct SecretFile {
    google_maps_api_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_addr: String,
    pub detector: DetectorSettings,
    pub imagery: ImagerySettings,
    pub output: OutputSettings,
    pub samples_dir: Option<PathBuf>,
    pub secret_path: PathBuf,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub input_size: u32,
    pub confidence: f32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct ImagerySettings {
    pub base_url: String,
    pub zoom: u8,
    pub size: String,
    pub timeout: Duration,
    pub download_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub save_annotated: bool,
    pub annotated_path: PathBuf,
    pub messages: MessageStyle,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_size: DEFAULT_INPUT_SIZE,
            confidence: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
        }
    }
}

impl ImagerySettings {
    pub fn client_config(&self) -> ImageryConfig {
        ImageryConfig {
            base_url: self.base_url.clone(),
            timeout: self.timeout,
            download_dir: self.download_dir.clone(),
        }
    }
}

impl AppConfig {
    /// Load from `SOLAR_CONFIG` (TOML, optional), then environment overrides,
    /// then the credential file when no key came from the environment.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SOLAR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        if cfg.api_key.is_none() {
            cfg.api_key = read_secret_file(&cfg.secret_path)?;
        }
        Ok(cfg)
    }

    /// Take the API key from an explicitly named credential file.
    ///
    /// Unlike the fallback in `load`, a missing file or a blank key is an error
    /// and the configured key is left untouched.
    pub fn use_secret_file(&mut self, path: &Path) -> Result<()> {
        let key = read_secret_file(path)?
            .ok_or_else(|| anyhow!("no API key found in {}", path.display()))?;
        self.secret_path = path.to_path_buf();
        self.api_key = Some(key);
        Ok(())
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let defaults = DetectorSettings::default();
        let detector = file.detector.unwrap_or_default();
        let imagery = file.imagery.unwrap_or_default();
        let output = file.output.unwrap_or_default();

        let messages = match output.messages.as_deref() {
            Some(style) => MessageStyle::parse(style)
                .ok_or_else(|| anyhow!("unknown message style '{}'", style))?,
            None => MessageStyle::Playful,
        };

        Ok(Self {
            server_addr: file
                .server
                .and_then(|server| server.addr)
                .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
            detector: DetectorSettings {
                backend: detector.backend.unwrap_or(defaults.backend),
                model_path: detector.model_path.unwrap_or(defaults.model_path),
                input_size: detector.input_size.unwrap_or(defaults.input_size),
                confidence: detector.confidence.unwrap_or(defaults.confidence),
                iou_threshold: detector.iou.unwrap_or(defaults.iou_threshold),
            },
            imagery: ImagerySettings {
                base_url: imagery
                    .base_url
                    .unwrap_or_else(|| imagery::DEFAULT_BASE_URL.to_string()),
                zoom: imagery.zoom.unwrap_or(imagery::DEFAULT_ZOOM),
                size: imagery
                    .size
                    .unwrap_or_else(|| imagery::DEFAULT_SIZE.to_string()),
                timeout: Duration::from_secs(
                    imagery
                        .timeout_secs
                        .unwrap_or(DEFAULT_IMAGERY_TIMEOUT_SECS),
                ),
                download_dir: imagery.download_dir.unwrap_or_else(|| PathBuf::from(".")),
            },
            output: OutputSettings {
                save_annotated: output.save_annotated.unwrap_or(false),
                annotated_path: output
                    .annotated_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_ANNOTATED_PATH)),
                messages,
            },
            samples_dir: file.samples_dir,
            secret_path: file
                .secret_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRET_PATH)),
            api_key: None,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("SOLAR_ADDR") {
            self.server_addr = addr;
        }
        if let Some(backend) = non_empty_env("SOLAR_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(path) = non_empty_env("SOLAR_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(conf) = non_empty_env("SOLAR_CONFIDENCE") {
            self.detector.confidence = conf
                .parse()
                .map_err(|_| anyhow!("SOLAR_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Some(url) = non_empty_env("SOLAR_IMAGERY_URL") {
            self.imagery.base_url = url;
        }
        if let Some(path) = non_empty_env("SOLAR_SECRET_PATH") {
            self.secret_path = PathBuf::from(path);
        }
        if let Some(dir) = non_empty_env("SOLAR_SAMPLES_DIR") {
            self.samples_dir = Some(PathBuf::from(dir));
        }
        if let Some(save) = non_empty_env("SOLAR_SAVE_ANNOTATED") {
            self.output.save_annotated = parse_bool(&save)
                .ok_or_else(|| anyhow!("SOLAR_SAVE_ANNOTATED must be true or false"))?;
        }
        if let Some(key) = non_empty_env("GOOGLE_MAPS_API_KEY") {
            self.api_key = Some(key);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.detector.backend = self.detector.backend.trim().to_lowercase();
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                self.detector.confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(anyhow!(
                "iou threshold must be within [0, 1], got {}",
                self.detector.iou_threshold
            ));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        if self.imagery.zoom > imagery::MAX_ZOOM {
            return Err(anyhow!(
                "zoom must be at most {}, got {}",
                imagery::MAX_ZOOM,
                self.imagery.zoom
            ));
        }
        imagery::parse_size(&self.imagery.size)?;
        if self.imagery.timeout.as_secs() == 0 {
            return Err(anyhow!("imagery timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Read the Google Maps key from a JSON credential file.
///
/// A missing file is not an error; the key can still arrive per request.
pub fn read_secret_file(path: &Path) -> Result<Option<String>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let secret: SecretFile = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid credential file {}: {}", path.display(), e))?;
    let key = secret.google_maps_api_key.trim().to_string();
    Ok((!key.is_empty()).then_some(key))
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
