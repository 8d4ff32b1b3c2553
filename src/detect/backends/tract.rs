#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::DetectionResult;
use crate::detect::yolo;

type Plan = TypedRunnableModel<TypedModel>;

/// Tract-based backend for a YOLO detector exported to ONNX.
///
/// The model takes a square `1x3xSxS` RGB tensor scaled to `[0, 1]`. Inputs of
/// any size are resized to `S` and boxes are mapped back afterwards.
pub struct TractBackend {
    model: Plan,
    input_size: u32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be positive"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            iou_threshold: yolo::DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the default suppression IoU.
    pub fn with_iou_threshold(mut self, iou: f32) -> Self {
        self.iou_threshold = iou;
        self
    }

    fn run_head(&self, input: Tensor) -> Result<(Vec<f32>, Vec<usize>)> {
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Ok((view.iter().copied().collect(), view.shape().to_vec()))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&self, image: &RgbImage, threshold: f32) -> Result<DetectionResult> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("cannot run detection on an empty image"));
        }
        let (data, shape) = self.run_head(input_tensor(image, self.input_size))?;
        let candidates = yolo::decode(&data, &shape, threshold)?;
        let kept = yolo::non_max_suppression(candidates, self.iou_threshold, yolo::MAX_DETECTIONS);
        let scaled = yolo::rescale(kept, (width, height), self.input_size);
        Ok(DetectionResult::new(scaled))
    }

    fn warm_up(&self) -> Result<()> {
        let side = self.input_size as usize;
        let blank = tract_ndarray::Array4::<f32>::zeros((1, 3, side, side)).into_tensor();
        self.run_head(blank).map(|_| ())
    }
}

/// `1x3xSxS` NCHW tensor of `image` stretched to `side` and scaled to `[0, 1]`.
fn input_tensor(image: &RgbImage, side: u32) -> Tensor {
    let resized = if image.dimensions() == (side, side) {
        image.clone()
    } else {
        imageops::resize(image, side, side, FilterType::Triangle)
    };
    let side = side as usize;
    tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
        resized.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0
    })
    .into_tensor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn input_tensor_is_square_nchw_and_normalised() {
        let image = RgbImage::from_pixel(64, 32, Rgb([255, 0, 51]));
        let tensor = input_tensor(&image, 16);
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);

        let view = tensor.to_array_view::<f32>().unwrap();
        for y in 0..16usize {
            for x in 0..16usize {
                assert!((view[&[0usize, 0, y, x][..]] - 1.0).abs() < 1e-6);
                assert_eq!(view[&[0usize, 1, y, x][..]], 0.0);
                assert!((view[&[0usize, 2, y, x][..]] - 0.2).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn same_size_input_keeps_pixels_in_place() {
        let image = RgbImage::from_fn(4, 4, |x, y| Rgb([(x * 60) as u8, (y * 60) as u8, 0]));
        let tensor = input_tensor(&image, 4);
        let view = tensor.to_array_view::<f32>().unwrap();
        assert!((view[&[0usize, 0, 1, 3][..]] - 180.0 / 255.0).abs() < 1e-6);
        assert!((view[&[0usize, 1, 2, 0][..]] - 120.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn missing_model_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TractBackend::new(dir.path().join("absent.onnx"), 640).is_err());
        assert!(TractBackend::new(dir.path().join("absent.onnx"), 0).is_err());
    }
}
