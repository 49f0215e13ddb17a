use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub version: f32,
    pub top_k: usize,
    pub labels: LabelsConfig,
    pub models: Vec<ModelSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LabelsConfig {
    pub path: String,
    pub fetch_url: String,
}

/// One ensemble member. `resize`, `crop`, `mean` and `std` must match the
/// transforms the model was trained with; a mismatch degrades accuracy
/// silently instead of erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub path: String,
    pub resize: u32,
    pub crop: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl EnsembleConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = workspace_root().join("config/ensemble.yaml");
        let config_str = std::fs::read_to_string(config_path)?;
        let config: EnsembleConfig = serde_yaml::from_str(&config_str)?;
        Ok(config)
    }
}

/// Directory that model and label paths in the manifest are relative to.
pub fn workspace_root() -> PathBuf {
    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        PathBuf::from(format!("{}/..", manifest_dir))
    } else {
        PathBuf::from("/usr/src/app")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest() {
        let yaml = r#"
version: 1.0
top_k: 5
labels:
  path: config/imagenet_classes.txt
  fetch_url: https://example.com/imagenet_classes.txt
models:
  - name: resnet50
    path: models/resnet50.pt
    resize: 232
    crop: 224
    mean: [0.485, 0.456, 0.406]
    std: [0.229, 0.224, 0.225]
  - name: vit_b_16
    path: models/vit_b_16.pt
    resize: 256
    crop: 224
    mean: [0.485, 0.456, 0.406]
    std: [0.229, 0.224, 0.225]
"#;
        let config: EnsembleConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[0].name, "resnet50");
        assert_eq!(config.models[0].crop, 224);
        assert_eq!(config.models[1].resize, 256);
    }

    #[test]
    fn rejects_missing_fields() {
        let yaml = "version: 1.0\ntop_k: 5\n";
        assert!(serde_yaml::from_str::<EnsembleConfig>(yaml).is_err());
    }
}
