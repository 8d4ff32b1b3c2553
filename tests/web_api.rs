mod common;

use std::io::{Cursor, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use tempfile::{tempdir, TempDir};

use common::{one_panel, rooftop_jpeg, FakeMaps};
use solar_detector::api::{ApiConfig, ApiHandle, ApiServer};
use solar_detector::{Classifier, DetectionService, ImageryClient, ImageryConfig};

struct TestApi {
    dir: TempDir,
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new(maps_url: &str, default_key: Option<&str>) -> Result<Self> {
        Self::with_samples(maps_url, default_key, |root| {
            let samples = root.join("samples");
            std::fs::create_dir(&samples)?;
            std::fs::write(samples.join("roof.jpg"), rooftop_jpeg())?;
            std::fs::write(samples.join("notes.txt"), b"not a sample")?;
            Ok(samples)
        })
    }

    fn with_samples(
        maps_url: &str,
        default_key: Option<&str>,
        samples_dir: impl FnOnce(&Path) -> Result<PathBuf>,
    ) -> Result<Self> {
        let dir = tempdir()?;
        let samples = samples_dir(dir.path())?;

        let imagery = ImageryClient::new(ImageryConfig {
            base_url: maps_url.to_string(),
            timeout: Duration::from_secs(5),
            download_dir: dir.path().join("downloads"),
        });
        let service = DetectionService::new(
            Classifier::new(Arc::new(one_panel(0.9))),
            imagery,
            default_key.map(str::to_string),
            19,
            "640x640",
        );
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            samples_dir: Some(samples),
        };
        let api_handle = ApiServer::new(api_config, service).spawn()?;
        Ok(Self {
            dir,
            api_handle: Some(api_handle),
        })
    }

    fn send(&self, head: &str, body: &[u8]) -> Result<(String, String)> {
        let addr = self
            .api_handle
            .as_ref()
            .expect("test API handle should be initialized")
            .addr;
        let mut stream = TcpStream::connect(addr)?;
        let request = format!(
            "{head}\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        stream.write_all(request.as_bytes())?;
        stream.write_all(body)?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;
        let response = String::from_utf8_lossy(&response).into_owned();
        let mut parts = response.splitn(2, "\r\n\r\n");
        let headers = parts.next().unwrap_or("").to_string();
        let body = parts.next().unwrap_or("").to_string();
        Ok((headers, body))
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

fn png_upload() -> Vec<u8> {
    let image = RgbImage::from_pixel(32, 32, Rgb([30, 60, 90]));
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("encode png");
    cursor.into_inner()
}

#[test]
fn health_and_index_are_served() -> Result<()> {
    let maps = FakeMaps::serve(200, rooftop_jpeg());
    let api = TestApi::new(&maps.base_url, Some("k"))?;

    let (headers, body) = api.send("GET /health HTTP/1.1", b"")?;
    assert!(headers.contains("200 OK"));
    assert!(body.contains(r#""status":"ok""#));
    assert!(body.contains(r#""backend":"stub""#));
    assert!(body.contains(r#""api_key_configured":true"#));

    let (headers, body) = api.send("GET / HTTP/1.1", b"")?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("text/html"));
    assert!(body.contains("Solar Panel Detector"));
    Ok(())
}

#[test]
fn uploaded_image_is_classified() -> Result<()> {
    let maps = FakeMaps::serve(200, rooftop_jpeg());
    let api = TestApi::new(&maps.base_url, Some("k"))?;

    let (headers, body) = api.send("POST /detect/image HTTP/1.1", &png_upload())?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["outcome"], "present");
    assert_eq!(value["detections"].as_array().map(Vec::len), Some(1));
    assert!(value.get("image_path").is_none());

    let jpeg = BASE64.decode(value["image"].as_str().unwrap_or_default())?;
    let annotated = image::load_from_memory(&jpeg)?;
    assert_eq!((annotated.width(), annotated.height()), (32, 32));
    Ok(())
}

#[test]
fn undecodable_upload_is_unprocessable() -> Result<()> {
    let maps = FakeMaps::serve(200, rooftop_jpeg());
    let api = TestApi::new(&maps.base_url, Some("k"))?;

    let (headers, body) = api.send("POST /detect/image HTTP/1.1", b"definitely not pixels")?;
    assert!(headers.contains("422 Unprocessable Entity"));
    assert!(body.contains(r#""error":"undecodable_image""#));

    let (headers, _) = api.send("POST /detect/image HTTP/1.1", b"")?;
    assert!(headers.contains("400 Bad Request"));
    Ok(())
}

#[test]
fn address_lookup_round_trips_through_imagery() -> Result<()> {
    let maps = FakeMaps::serve(200, rooftop_jpeg());
    let api = TestApi::new(&maps.base_url, Some("k"))?;

    let (headers, body) = api.send(
        "POST /detect/address HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded",
        b"address=1+Main+St+Springfield+USA&zoom=20",
    )?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["outcome"], "present");
    let expected = api.dir.path().join("downloads").join("Springfield_USA.jpg");
    assert_eq!(value["image_path"], expected.display().to_string());

    let requests = maps.requests();
    assert!(requests[0].contains("zoom=20"));
    assert!(requests[0].contains("key=k"));
    Ok(())
}

#[test]
fn address_lookup_reports_missing_key_and_upstream_failure() -> Result<()> {
    let maps = FakeMaps::serve(403, b"denied".to_vec());

    let api = TestApi::new(&maps.base_url, None)?;
    let (headers, body) = api.send(
        "POST /detect/address HTTP/1.1\r\nContent-Type: application/json",
        br#"{"address": "X"}"#,
    )?;
    assert!(headers.contains("400 Bad Request"));
    assert!(body.contains(r#""error":"missing_api_key""#));

    let (headers, body) = api.send(
        "POST /detect/address HTTP/1.1\r\nContent-Type: application/json",
        br#"{"address": "X", "api_key": "k"}"#,
    )?;
    assert!(headers.contains("502 Bad Gateway"));
    assert!(body.contains(r#""error":"imagery_unavailable""#));
    Ok(())
}

#[test]
fn samples_are_listed_and_classified() -> Result<()> {
    let maps = FakeMaps::serve(200, rooftop_jpeg());
    let api = TestApi::new(&maps.base_url, Some("k"))?;

    let (headers, body) = api.send("GET /samples HTTP/1.1", b"")?;
    assert!(headers.contains("200 OK"));
    let names: Vec<String> = serde_json::from_str(&body)?;
    assert_eq!(names, vec!["roof.jpg".to_string()]);

    let (headers, body) = api.send("POST /detect/sample?name=roof.jpg HTTP/1.1", b"")?;
    assert!(headers.contains("200 OK"));
    assert!(body.contains(r#""outcome":"present""#));

    let (headers, _) = api.send("POST /detect/sample?name=../secret.json HTTP/1.1", b"")?;
    assert!(headers.contains("404 Not Found"));
    Ok(())
}

#[test]
fn unknown_routes_and_wrong_methods_are_rejected() -> Result<()> {
    let maps = FakeMaps::serve(200, rooftop_jpeg());
    let api = TestApi::new(&maps.base_url, Some("k"))?;

    let (headers, _) = api.send("GET /nope HTTP/1.1", b"")?;
    assert!(headers.contains("404 Not Found"));

    let (headers, body) = api.send("GET /detect/image HTTP/1.1", b"")?;
    assert!(headers.contains("405 Method Not Allowed"));
    assert!(body.contains("method_not_allowed"));
    Ok(())
}

#[test]
fn health_reports_missing_default_key() -> Result<()> {
    let maps = FakeMaps::serve(200, rooftop_jpeg());
    let api = TestApi::new(&maps.base_url, None)?;

    let (headers, body) = api.send("GET /health HTTP/1.1", b"")?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["api_key_configured"], false);
    assert!((value["confidence"].as_f64().unwrap_or_default() - 0.45).abs() < 1e-6);
    Ok(())
}

#[test]
fn missing_samples_dir_still_answers() -> Result<()> {
    let maps = FakeMaps::serve(200, rooftop_jpeg());
    let api = TestApi::with_samples(&maps.base_url, Some("k"), |root| {
        Ok(root.join("does-not-exist"))
    })?;

    let (headers, body) = api.send("GET /samples HTTP/1.1", b"")?;
    assert!(headers.contains("200 OK"));
    let names: Vec<String> = serde_json::from_str(&body)?;
    assert!(names.is_empty());

    let (headers, _) = api.send("POST /detect/sample?name=roof.jpg HTTP/1.1", b"")?;
    assert!(headers.contains("404 Not Found"));
    Ok(())
}

#[test]
fn unreadable_samples_dir_is_a_server_error() -> Result<()> {
    let maps = FakeMaps::serve(200, rooftop_jpeg());
    let api = TestApi::with_samples(&maps.base_url, Some("k"), |root| {
        let file = root.join("samples");
        std::fs::write(&file, b"a file, not a directory")?;
        Ok(file)
    })?;

    let (headers, body) = api.send("GET /samples HTTP/1.1", b"")?;
    assert!(headers.contains("500 Internal Server Error"));
    assert!(body.contains(r#""error":"samples_unavailable""#));
    Ok(())
}
