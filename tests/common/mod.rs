#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};

use solar_detector::annotate::encode_jpeg;
use solar_detector::{BoundingBox, Detection, StubBackend};

/// In-process stand-in for the static-map endpoint.
///
/// Answers every request with the same status and body, and records the
/// request lines it saw.
pub struct FakeMaps {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeMaps {
    pub fn serve(status: u16, body: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake maps");
        let addr = listener.local_addr().expect("fake maps addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut data = Vec::new();
                let mut buf = [0u8; 1024];
                while !data.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => data.extend_from_slice(&buf[..n]),
                    }
                }
                let text = String::from_utf8_lossy(&data);
                if let Some(line) = text.lines().next() {
                    seen.lock().unwrap().push(line.to_string());
                }
                let reason = if status == 200 { "OK" } else { "Error" };
                let header = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&body);
            }
        });
        Self {
            base_url: format!("http://{}/maps/api/staticmap", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// A base URL nothing is listening on.
pub fn dead_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{}/maps/api/staticmap", addr)
}

pub fn rooftop_jpeg() -> Vec<u8> {
    let image = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 120]));
    encode_jpeg(&image).expect("encode fixture")
}

/// Stub detector reporting a single panel at the given confidence.
pub fn one_panel(confidence: f32) -> StubBackend {
    StubBackend::with_detections(vec![Detection::new(
        BoundingBox::new(8.0, 8.0, 40.0, 30.0),
        confidence,
        0,
    )])
}
