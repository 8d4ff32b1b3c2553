//! Rendering detections onto images.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, DetectionResult};

const BOX_THICKNESS: u32 = 3;
const JPEG_QUALITY: u8 = 90;

const PALETTE: [Rgb<u8>; 4] = [
    Rgb([255, 56, 56]),
    Rgb([255, 157, 151]),
    Rgb([255, 112, 31]),
    Rgb([255, 178, 29]),
];

pub fn color_for_class(class_id: usize) -> Rgb<u8> {
    PALETTE[class_id % PALETTE.len()]
}

/// Copy of `image` with a rectangle drawn around every detection.
pub fn annotate(image: &RgbImage, result: &DetectionResult) -> RgbImage {
    let mut canvas = image.clone();
    for detection in result.detections() {
        draw_box(&mut canvas, &detection.bbox, color_for_class(detection.class_id));
    }
    canvas
}

fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let x1 = bbox.x1.clamp(0.0, max_x).round() as i32;
    let y1 = bbox.y1.clamp(0.0, max_y).round() as i32;
    let x2 = bbox.x2.clamp(0.0, max_x).round() as i32;
    let y2 = bbox.y2.clamp(0.0, max_y).round() as i32;

    for inset in 0..BOX_THICKNESS as i32 {
        let w = x2 - x1 + 1 - 2 * inset;
        let h = y2 - y1 + 1 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

/// Encode as baseline JPEG.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY)
        .encode_image(image)
        .context("encode annotated image as jpeg")?;
    Ok(cursor.into_inner())
}

/// Write the JPEG encoding of `image` to `path`, returning the bytes written.
pub fn save_jpeg(image: &RgbImage, path: &Path) -> Result<Vec<u8>> {
    let bytes = encode_jpeg(image)?;
    std::fs::write(path, &bytes)
        .with_context(|| format!("write annotated image to {}", path.display()))?;
    Ok(bytes)
}
