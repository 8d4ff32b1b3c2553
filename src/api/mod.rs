//! Web UI and JSON API.
//!
//! A single-threaded HTTP/1.1 server on a plain `TcpListener`: one request per
//! connection, handled to completion before the next is accepted.

mod page;

use crate::classify::Classification;
use crate::error::DetectError;
use crate::pipeline::{AddressQuery, DetectionService};
use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_HEADER_BYTES: usize = 8192;
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
const SAMPLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub samples_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:7860".to_string(),
            samples_dir: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    service: DetectionService,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, service: DetectionService) -> Self {
        Self { cfg, service }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let service = self.service;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, &cfg, &service, shutdown_thread) {
                log::error!("web server stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: &ApiConfig,
    service: &DetectionService,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, cfg, service) {
                    log::warn!("web request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    service: &DetectionService,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(RequestError::TooLarge) => {
            write_json_response(&mut stream, 413, r#"{"error":"payload_too_large"}"#)?;
            return Err(anyhow!("request body too large"));
        }
        Err(RequestError::Malformed(err)) => {
            write_json_response(&mut stream, 400, r#"{"error":"bad_request"}"#)?;
            return Err(err);
        }
    };
    log::info!("{} {}", request.method, request.path);

    let allowed = match request.path.as_str() {
        "/" | "/health" | "/samples" => "GET",
        "/detect/address" | "/detect/image" | "/detect/sample" => "POST",
        _ => {
            write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)?;
            return Ok(());
        }
    };
    if request.method != allowed {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }

    match request.path.as_str() {
        "/" => write_response(
            &mut stream,
            200,
            "text/html; charset=utf-8",
            page::INDEX_HTML.as_bytes(),
        ),
        "/health" => {
            let body = serde_json::json!({
                "status": "ok",
                "backend": service.classifier().backend_name(),
                "confidence": service.classifier().confidence(),
                "api_key_configured": service.has_default_api_key(),
            });
            write_response(
                &mut stream,
                200,
                "application/json",
                &serde_json::to_vec(&body)?,
            )
        }
        "/samples" => {
            let samples = match cfg.samples_dir.as_deref().map(list_samples) {
                Some(Ok(samples)) => samples,
                Some(Err(err)) => {
                    log::error!("listing samples failed: {:#}", err);
                    return write_json_response(
                        &mut stream,
                        500,
                        r#"{"error":"samples_unavailable"}"#,
                    );
                }
                None => Vec::new(),
            };
            write_response(
                &mut stream,
                200,
                "application/json",
                &serde_json::to_vec(&samples)?,
            )
        }
        "/detect/address" => {
            let query = match parse_address_form(&request) {
                Ok(query) => query,
                Err(err) => return write_error(&mut stream, &err),
            };
            match service.detect_address(&query) {
                Ok(result) => write_classification(
                    &mut stream,
                    &result.classification,
                    Some(&result.image_path),
                ),
                Err(err) => write_error(&mut stream, &err),
            }
        }
        "/detect/image" => {
            if request.body.is_empty() {
                let err = DetectError::InvalidRequest("request body is empty".into());
                return write_error(&mut stream, &err);
            }
            match service.detect_bytes(&request.body) {
                Ok(classification) => write_classification(&mut stream, &classification, None),
                Err(err) => write_error(&mut stream, &err),
            }
        }
        "/detect/sample" => {
            let Some(dir) = &cfg.samples_dir else {
                write_json_response(&mut stream, 404, r#"{"error":"no_samples"}"#)?;
                return Ok(());
            };
            let Some(path) = request
                .query_param("name")
                .and_then(|name| sample_path(dir, &name))
            else {
                write_json_response(&mut stream, 404, r#"{"error":"unknown_sample"}"#)?;
                return Ok(());
            };
            match service.classifier().classify_path(&path) {
                Ok(classification) => write_classification(&mut stream, &classification, None),
                Err(err) => write_error(&mut stream, &err),
            }
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

#[derive(Serialize)]
struct ClassificationBody<'a> {
    outcome: &'static str,
    message: &'a str,
    detections: &'a crate::detect::DetectionResult,
    /// Annotated image as base64 JPEG.
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_path: Option<String>,
}

fn write_classification(
    stream: &mut TcpStream,
    classification: &Classification,
    image_path: Option<&Path>,
) -> Result<()> {
    let jpeg = crate::annotate::encode_jpeg(&classification.annotated)?;
    let body = ClassificationBody {
        outcome: classification.outcome.as_str(),
        message: &classification.message,
        detections: &classification.detections,
        image: BASE64.encode(jpeg),
        image_path: image_path.map(|p| p.display().to_string()),
    };
    write_response(stream, 200, "application/json", &serde_json::to_vec(&body)?)
}

fn write_error(stream: &mut TcpStream, err: &DetectError) -> Result<()> {
    let (status, code) = error_status(err);
    if status >= 500 {
        log::error!("request failed: {}", err);
    } else {
        log::warn!("request failed: {}", err);
    }
    let body = serde_json::json!({ "error": code, "detail": err.to_string() });
    write_response(stream, status, "application/json", &serde_json::to_vec(&body)?)
}

fn error_status(err: &DetectError) -> (u16, &'static str) {
    match err {
        DetectError::InvalidRequest(_) => (400, "invalid_request"),
        DetectError::MissingApiKey => (400, "missing_api_key"),
        DetectError::InvalidThreshold(_) => (400, "invalid_threshold"),
        DetectError::Decode(_) => (422, "undecodable_image"),
        DetectError::ImageryUnavailable { .. } => (502, "imagery_unavailable"),
        DetectError::Model(_) => (500, "detector_failed"),
        DetectError::Save(_) | DetectError::Io(_) => (500, "internal_error"),
    }
}

#[derive(Deserialize)]
struct AddressForm {
    address: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    zoom: Option<u8>,
}

fn parse_address_form(request: &HttpRequest) -> Result<AddressQuery, DetectError> {
    let is_json = request
        .headers
        .get("content-type")
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/json"));
    let form = if is_json {
        serde_json::from_slice::<AddressForm>(&request.body)
            .map_err(|e| DetectError::InvalidRequest(format!("invalid json body: {}", e)))?
    } else {
        let fields: HashMap<String, String> = url::form_urlencoded::parse(&request.body)
            .into_owned()
            .collect();
        let zoom = match fields.get("zoom").map(|z| z.trim()).filter(|z| !z.is_empty()) {
            Some(z) => Some(
                z.parse::<u8>()
                    .map_err(|_| DetectError::InvalidRequest(format!("invalid zoom '{}'", z)))?,
            ),
            None => None,
        };
        AddressForm {
            address: fields.get("address").cloned().unwrap_or_default(),
            api_key: fields.get("api_key").cloned(),
            zoom,
        }
    };
    if form.address.trim().is_empty() {
        return Err(DetectError::InvalidRequest("address is required".into()));
    }
    Ok(AddressQuery {
        address: form.address,
        api_key: form.api_key,
        zoom: form.zoom,
    })
}

/// Sample file names in `dir`, sorted. A missing directory has no samples.
fn list_samples(dir: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("samples directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read samples dir {}", dir.display()));
        }
    };
    let mut names = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || !has_sample_extension(&path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Resolve a sample name to a file inside `dir`; plain file names only.
fn sample_path(dir: &Path, name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    let plain = candidate.components().count() == 1
        && candidate.file_name().is_some_and(|n| n == name)
        && !name.starts_with('.');
    if !plain {
        return None;
    }
    let path = dir.join(candidate);
    (path.is_file() && has_sample_extension(&path)).then_some(path)
}

fn has_sample_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SAMPLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

enum RequestError {
    TooLarge,
    Malformed(anyhow::Error),
}

impl From<anyhow::Error> for RequestError {
    fn from(err: anyhow::Error) -> Self {
        RequestError::Malformed(err)
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Malformed(err.into())
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest, RequestError> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(RequestError::TooLarge);
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before headers completed").into());
        }
        data.extend_from_slice(&buf[..n]);
    };

    let text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::TooLarge);
    }

    let mut body = data.split_off(header_end + 4);
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before body completed").into());
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        raw_path: raw_path.to_string(),
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        422 => "HTTP/1.1 422 Unprocessable Entity",
        502 => "HTTP/1.1 502 Bad Gateway",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    raw_path: String,
    body: Vec<u8>,
}

impl HttpRequest {
    fn query_param(&self, key: &str) -> Option<String> {
        let query = self.raw_path.split_once('?')?.1;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)], body: &[u8]) -> HttpRequest {
        HttpRequest {
            method: "POST".into(),
            path: "/detect/address".into(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            raw_path: "/detect/address".into(),
            body: body.to_vec(),
        }
    }

    #[test]
    fn parses_urlencoded_address_form() {
        let req = request(
            &[("content-type", "application/x-www-form-urlencoded")],
            b"address=anger+strase+12%2C+gottingen&api_key=k&zoom=19",
        );
        let query = parse_address_form(&req).unwrap();
        assert_eq!(query.address, "anger strase 12, gottingen");
        assert_eq!(query.api_key.as_deref(), Some("k"));
        assert_eq!(query.zoom, Some(19));
    }

    #[test]
    fn parses_json_address_form() {
        let req = request(
            &[("content-type", "application/json")],
            br#"{"address":"X","zoom":18}"#,
        );
        let query = parse_address_form(&req).unwrap();
        assert_eq!(query.address, "X");
        assert_eq!(query.api_key, None);
        assert_eq!(query.zoom, Some(18));
    }

    #[test]
    fn rejects_missing_address_and_bad_zoom() {
        let req = request(&[], b"api_key=k");
        assert!(matches!(
            parse_address_form(&req),
            Err(DetectError::InvalidRequest(_))
        ));
        let req = request(&[], b"address=X&zoom=high");
        assert!(parse_address_form(&req).is_err());
    }

    #[test]
    fn sample_names_must_be_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("roof.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        assert!(sample_path(dir.path(), "roof.jpg").is_some());
        assert!(sample_path(dir.path(), "notes.txt").is_none());
        assert!(sample_path(dir.path(), "../roof.jpg").is_none());
        assert!(sample_path(dir.path(), "missing.jpg").is_none());
        assert_eq!(list_samples(dir.path()).unwrap(), vec!["roof.jpg"]);
    }

    #[test]
    fn error_statuses() {
        assert_eq!(error_status(&DetectError::MissingApiKey).0, 400);
        assert_eq!(
            error_status(&DetectError::ImageryUnavailable {
                address: "X".into()
            })
            .0,
            502
        );
        assert_eq!(
            error_status(&DetectError::Model(anyhow!("boom"))).0,
            500
        );
    }

    #[test]
    fn missing_samples_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_samples(&dir.path().join("gone")).unwrap().is_empty());

        let not_a_dir = dir.path().join("roof.jpg");
        std::fs::write(&not_a_dir, b"x").unwrap();
        assert!(list_samples(&not_a_dir).is_err());
    }
}
