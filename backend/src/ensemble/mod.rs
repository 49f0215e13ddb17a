pub mod config;
pub mod labels;
pub mod model;
pub mod scoring;

use image::RgbImage;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tch::Device;
use tokio::sync::OnceCell;

use config::EnsembleConfig;
use model::{EnsembleModel, InferenceError};
use shared::ModelPrediction;

pub struct ModelOutput {
    pub model_name: String,
    pub predictions: Vec<ModelPrediction>,
}

/// The loaded ensemble: every member reads the same decoded image and the
/// per-model outputs are combined downstream by `scoring`.
pub struct VisionEnsemble {
    models: Vec<EnsembleModel>,
    labels: Vec<String>,
    top_k: usize,
}

impl VisionEnsemble {
    pub async fn load(
        config: &EnsembleConfig,
        root: &std::path::Path,
        http: &reqwest::Client,
    ) -> Result<Self, InferenceError> {
        let labels = labels::load_vocabulary(&config.labels, http, root).await;

        let device = Device::cuda_if_available();
        let mut models = Vec::new();
        for spec in &config.models {
            match EnsembleModel::load(spec, &root.join(&spec.path), device) {
                Ok(model) => {
                    info!("Loaded ensemble model {}", spec.name);
                    models.push(model);
                }
                Err(e) => warn!("Failed to load ensemble model {}: {}", spec.name, e),
            }
        }

        if models.is_empty() {
            return Err(InferenceError::NoModelsAvailable);
        }
        Ok(Self {
            models,
            labels,
            top_k: config.top_k,
        })
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }

    /// Runs every member over the image. A failing member is dropped from
    /// the result rather than aborting the prediction; only a fully failed
    /// ensemble is an error.
    pub fn predict(&self, image: &RgbImage) -> Result<Vec<ModelOutput>, InferenceError> {
        let mut outputs = Vec::with_capacity(self.models.len());
        for model in &self.models {
            match model.predict_top_k(image, &self.labels, self.top_k) {
                Ok(predictions) => outputs.push(ModelOutput {
                    model_name: model.name.clone(),
                    predictions,
                }),
                Err(e) => warn!("Ensemble model {} failed: {}", model.name, e),
            }
        }

        if outputs.is_empty() {
            return Err(InferenceError::NoModelsAvailable);
        }
        Ok(outputs)
    }
}

/// Process-wide registry for the ensemble. Model weights and the label
/// vocabulary load at most once; concurrent first callers await the same
/// load instead of duplicating it. A failed load leaves the cell empty so
/// a later request may retry.
pub struct EnsembleRegistry {
    config: EnsembleConfig,
    root: PathBuf,
    http: reqwest::Client,
    cell: OnceCell<Arc<VisionEnsemble>>,
}

impl EnsembleRegistry {
    pub fn new(config: EnsembleConfig, root: PathBuf) -> Self {
        Self {
            config,
            root,
            http: reqwest::Client::new(),
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<VisionEnsemble>, InferenceError> {
        self.cell
            .get_or_try_init(|| async {
                info!(
                    "Initializing vision ensemble ({} configured models)",
                    self.config.models.len()
                );
                VisionEnsemble::load(&self.config, &self.root, &self.http)
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }
}
