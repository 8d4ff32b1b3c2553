//! Decoding of YOLO-style detection heads.
//!
//! An exported YOLOv8 head is a single `[1, 4 + classes, anchors]` tensor
//! where each anchor column holds `cx, cy, w, h` followed by one score per
//! class. Some exports transpose it to `[1, anchors, 4 + classes]`; both
//! layouts are accepted.

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, Detection};

/// Default IoU above which overlapping boxes of the same class are merged.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;

/// Upper bound on detections kept per image.
pub const MAX_DETECTIONS: usize = 300;

/// Decode raw head output into candidate detections in model-input pixels.
///
/// Candidates below `threshold` are dropped. No suppression is applied here.
pub fn decode(data: &[f32], shape: &[usize], threshold: f32) -> Result<Vec<Detection>> {
    let (rows, cols) = match shape {
        [1, a, b] => (*a, *b),
        [a, b] => (*a, *b),
        other => return Err(anyhow!("unexpected detection head shape {:?}", other)),
    };
    let expected = rows
        .checked_mul(cols)
        .ok_or_else(|| anyhow!("detection head shape overflows"))?;
    if data.len() != expected {
        return Err(anyhow!(
            "detection head holds {} values, shape {:?} needs {}",
            data.len(),
            shape,
            expected
        ));
    }

    // Channels are the short axis: a 640 input yields 8400 anchors vs 4 + classes.
    let channels_first = rows <= cols;
    let (channels, anchors) = if channels_first {
        (rows, cols)
    } else {
        (cols, rows)
    };
    if channels < 5 {
        return Err(anyhow!(
            "detection head has {} channels; need box + at least one class",
            channels
        ));
    }

    let at = |channel: usize, anchor: usize| -> f32 {
        if channels_first {
            data[channel * anchors + anchor]
        } else {
            data[anchor * channels + channel]
        }
    };

    let mut out = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (4..channels)
            .map(|c| (c - 4, at(c, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if !score.is_finite() || score < threshold {
            continue;
        }
        let bbox = BoundingBox::from_center(
            at(0, anchor),
            at(1, anchor),
            at(2, anchor),
            at(3, anchor),
        );
        out.push(Detection::new(bbox, score, class_id));
    }
    Ok(out)
}

/// Greedy per-class non-maximum suppression.
///
/// Returns survivors ordered by descending confidence, capped at `max_detections`.
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let overlaps = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

/// Map boxes from the square model input back onto a `width x height` source.
///
/// Each axis is scaled on its own, matching the stretch applied when the
/// source was resized to `input_size x input_size`.
pub fn rescale(detections: Vec<Detection>, source: (u32, u32), input_size: u32) -> Vec<Detection> {
    if input_size == 0 {
        return detections;
    }
    let sx = source.0 as f32 / input_size as f32;
    let sy = source.1 as f32 / input_size as f32;
    detections
        .into_iter()
        .map(|mut det| {
            det.bbox = det.bbox.scale(sx, sy);
            det
        })
        .collect()
}
