pub mod plantnet_service;
pub mod router;
pub mod vision_service;

use serde::Serialize;

/// A provider call that did not produce a usable result. The router treats
/// every variant as "inconclusive" and moves on to the next stage; nothing
/// here aborts a classification.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} unavailable: {reason}")]
    Unavailable {
        provider: &'static str,
        reason: String,
    },
    #[error("{provider} returned no usable suggestion")]
    NoSuggestion { provider: &'static str },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Malformed provider response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct VisionLabel {
    pub description: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct WebDetection {
    pub entities: Vec<VisionLabel>,
    pub best_guess: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectedObject {
    pub name: String,
    pub score: f32,
    pub bounding_box: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DominantColor {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub pixel_fraction: f32,
}

#[derive(Debug, Clone)]
pub struct PlantSuggestion {
    pub scientific_name: String,
    pub common_names: Vec<String>,
    pub score: f32,
}

/// General-purpose vision capabilities. Each call fails independently; a
/// failure in one never poisons the others.
pub trait VisionProvider {
    async fn detect_labels(&self, image: &[u8]) -> Result<Vec<VisionLabel>, ProviderError>;
    async fn detect_web_entities(&self, image: &[u8]) -> Result<WebDetection, ProviderError>;
    async fn detect_objects(&self, image: &[u8]) -> Result<Vec<DetectedObject>, ProviderError>;
    async fn detect_text(&self, image: &[u8]) -> Result<Option<String>, ProviderError>;
    async fn detect_properties(&self, image: &[u8]) -> Result<Vec<DominantColor>, ProviderError>;
}

/// Plant-specialist capability. A missing credential yields `Ok(None)`
/// rather than an error.
pub trait PlantProvider {
    async fn identify(&self, image: &[u8]) -> Result<Option<PlantSuggestion>, ProviderError>;
}
