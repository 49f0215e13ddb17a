use image::RgbImage;
use image::imageops::{self, FilterType};
use std::sync::Mutex;
use tch::nn::ModuleT;
use tch::{CModule, Device, Kind, Tensor};

use crate::ensemble::config::ModelSpec;
use crate::ensemble::labels;
use shared::ModelPrediction;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),
    #[error("model execution failed: {0}")]
    Model(#[from] tch::TchError),
    #[error("no ensemble model produced predictions")]
    NoModelsAvailable,
    #[error("no category scores to aggregate")]
    NoScoresAvailable,
}

/// One member of the vision ensemble: a TorchScript module plus the
/// preprocessing parameters it was trained with. The module sits behind a
/// mutex so the loaded ensemble can be shared across server workers.
pub struct EnsembleModel {
    pub name: String,
    module: Mutex<CModule>,
    spec: ModelSpec,
    device: Device,
}

impl EnsembleModel {
    pub fn load(spec: &ModelSpec, path: &std::path::Path, device: Device) -> Result<Self, InferenceError> {
        let module = CModule::load_on_device(path, device)?;
        Ok(Self {
            name: spec.name.clone(),
            module: Mutex::new(module),
            spec: spec.clone(),
            device,
        })
    }

    /// Runs the model over one decoded image and returns its top-K labels
    /// in descending probability order.
    pub fn predict_top_k(
        &self,
        image: &RgbImage,
        labels: &[String],
        top_k: usize,
    ) -> Result<Vec<ModelPrediction>, InferenceError> {
        let input = preprocess(image, &self.spec)?.to_device(self.device);
        let output = self.module.lock().unwrap().forward_t(&input, false);
        let probs = output.softmax(-1, Kind::Float).view([-1]);

        let k = (top_k as i64).min(probs.size()[0]);
        let (top_probs, top_indices) = probs.topk(k, -1, true, true);

        let mut predictions = Vec::with_capacity(k as usize);
        for rank in 0..k {
            let index = top_indices.int64_value(&[rank]) as usize;
            predictions.push(ModelPrediction {
                label: labels::label_at(labels, index).to_string(),
                probability: top_probs.double_value(&[rank]) as f32,
            });
        }
        Ok(predictions)
    }
}

/// Resize the shorter edge to `spec.resize`, center-crop to `spec.crop`,
/// and normalize each channel into a CHW float tensor.
pub fn preprocess(image: &RgbImage, spec: &ModelSpec) -> Result<Tensor, InferenceError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(InferenceError::Preprocessing("empty image".into()));
    }
    if spec.crop == 0 || spec.resize < spec.crop {
        return Err(InferenceError::Preprocessing(format!(
            "invalid transform for {}: resize {} crop {}",
            spec.name, spec.resize, spec.crop
        )));
    }

    let (resize_w, resize_h) = if width <= height {
        let scaled = (height as f32 * spec.resize as f32 / width as f32).round() as u32;
        (spec.resize, scaled.max(spec.resize))
    } else {
        let scaled = (width as f32 * spec.resize as f32 / height as f32).round() as u32;
        (scaled.max(spec.resize), spec.resize)
    };
    let resized = imageops::resize(image, resize_w, resize_h, FilterType::Triangle);

    let crop = spec.crop;
    let x = (resize_w - crop) / 2;
    let y = (resize_h - crop) / 2;
    let cropped = imageops::crop_imm(&resized, x, y, crop, crop).to_image();

    let plane = (crop * crop) as usize;
    let mut buffer = vec![0.0f32; 3 * plane];
    for (px, py, pixel) in cropped.enumerate_pixels() {
        let offset = (py * crop + px) as usize;
        for channel in 0..3 {
            buffer[channel * plane + offset] =
                (pixel[channel] as f32 / 255.0 - spec.mean[channel]) / spec.std[channel];
        }
    }

    Ok(Tensor::from_slice(&buffer).view([1, 3, crop as i64, crop as i64]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(resize: u32, crop: u32) -> ModelSpec {
        ModelSpec {
            name: "test".into(),
            path: "models/test.pt".into(),
            resize,
            crop,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }

    #[test]
    fn preprocess_produces_nchw_tensor() {
        let image = RgbImage::from_pixel(8, 6, image::Rgb([255, 0, 128]));
        let tensor = preprocess(&image, &spec(4, 2)).unwrap();
        assert_eq!(tensor.size(), vec![1, 3, 2, 2]);
    }

    #[test]
    fn preprocess_normalizes_channels() {
        // Uniform white with mean/std 0.5 maps every element to exactly 1.0.
        let image = RgbImage::from_pixel(10, 10, image::Rgb([255, 255, 255]));
        let tensor = preprocess(&image, &spec(4, 4)).unwrap();
        let min = tensor.min().double_value(&[]);
        let max = tensor.max().double_value(&[]);
        assert!((min - 1.0).abs() < 1e-6);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn preprocess_rejects_bad_transform() {
        let image = RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 0]));
        assert!(preprocess(&image, &spec(2, 4)).is_err());
    }
}
