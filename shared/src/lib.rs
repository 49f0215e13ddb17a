use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{Display, EnumString};

/// Coarse category produced by the local pre-classifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SpeciesCategory {
    Plant,
    Animal,
}

/// One ranked label from a single vision model's top-K output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelPrediction {
    pub label: String,
    pub probability: f32,
}

/// Plant/animal evidence accumulated from one model's top-K predictions.
/// Scores are non-negative and do not sum to one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryScore {
    pub plant_score: f32,
    pub animal_score: f32,
}

/// Normalized ensemble verdict. `confidence` is the winning side's
/// normalized share, so it always lies in [0.5, 1.0].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleDecision {
    pub category: SpeciesCategory,
    pub confidence: f32,
    pub per_model_scores: Vec<CategoryScore>,
}

/// Canonical classification result. Every provider adapter normalizes its
/// native response into this shape; the pipeline returns it unchanged to
/// the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub label: Option<String>,
    pub confidence: Option<f32>,
    pub source: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl ProviderResult {
    pub fn empty() -> Self {
        Self {
            label: None,
            confidence: None,
            source: None,
            error: None,
            extra: Map::new(),
        }
    }

    /// A result the router can act on: it carries a label and no error.
    pub fn is_usable(&self) -> bool {
        self.error.is_none() && self.label.as_deref().is_some_and(|l| !l.is_empty())
    }
}

/// Encyclopedic metadata attached to a classified label. Augments a
/// `ProviderResult`, never replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub page_title: String,
    pub summary: String,
    pub external_id: Option<String>,
    pub scientific_name: Option<String>,
    pub reference_url: String,
}
