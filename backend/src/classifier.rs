use image::RgbImage;
use log::{info, warn};
use serde_json::{Map, Value, json};
use std::time::Duration;

use crate::ensemble::{EnsembleRegistry, scoring};
use crate::enrichment::wikipedia_service::{self, WikipediaService};
use crate::merge;
use crate::providers::plantnet_service::PlantNetService;
use crate::providers::router::{AuxiliaryDetails, ProviderRouter};
use crate::providers::vision_service::VisionService;
use shared::{EnsembleDecision, ProviderResult};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = "NatureScope/1.0";

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] image::ImageError),
}

/// The full classification pipeline: decode, pre-classify with the local
/// ensemble, route across providers, enrich, merge.
pub struct SpeciesClassifier {
    ensemble: EnsembleRegistry,
    router: ProviderRouter<PlantNetService, VisionService>,
    enricher: WikipediaService,
    http: reqwest::Client,
}

impl SpeciesClassifier {
    pub fn new(ensemble: EnsembleRegistry, plantnet: PlantNetService, vision: VisionService) -> Self {
        Self {
            ensemble,
            router: ProviderRouter::new(plantnet, vision),
            enricher: WikipediaService::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Startup warmup. A failure only logs: providers can still classify
    /// without the local pre-classifier.
    pub async fn warm_up(&self) {
        match self.ensemble.get().await {
            Ok(ensemble) => info!(
                "Vision ensemble ready: {}",
                ensemble.model_names().join(", ")
            ),
            Err(e) => warn!("Ensemble unavailable at startup: {}", e),
        }
    }

    pub async fn classify(&self, image_bytes: &[u8]) -> Result<ProviderResult, ClassifyError> {
        let image = decode_image(image_bytes)?;

        let decision = self.pre_classify(&image).await;
        if let Some(decision) = &decision {
            info!(
                "Ensemble decision: {} (confidence {:.2})",
                decision.category, decision.confidence
            );
        }

        let (routed, aux) = self.router.route(decision.as_ref(), image_bytes).await;

        let enrichment = match routed.label.as_deref() {
            Some(label) => {
                let candidates = enrichment_candidates(label, &aux.entity_candidates);
                self.enricher.enrich(&candidates).await
            }
            None => None,
        };

        let auxiliary = auxiliary_map(aux, decision.as_ref());
        Ok(merge::merge(routed, enrichment, Some(auxiliary)))
    }

    /// Downloads and classifies. Download failures come back inside the
    /// result's `error` field, mirroring how provider failures degrade.
    pub async fn classify_from_url(&self, url: &str) -> Result<ProviderResult, ClassifyError> {
        info!("Classifying image from URL: {}", url);
        let image_bytes = match self.download(url).await {
            Ok(bytes) => bytes,
            Err(reason) => {
                warn!("Download failed for {}: {}", url, reason);
                let mut result = ProviderResult::empty();
                result.error = Some(format!("Failed to download image: {}", reason));
                return Ok(result);
            }
        };
        self.classify(&image_bytes).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        info!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn pre_classify(&self, image: &RgbImage) -> Option<EnsembleDecision> {
        let ensemble = match self.ensemble.get().await {
            Ok(ensemble) => ensemble,
            Err(e) => {
                warn!("Pre-classifier unavailable: {}; routing without a category hint", e);
                return None;
            }
        };

        let outputs = match ensemble.predict(image) {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!("Ensemble prediction failed: {}", e);
                return None;
            }
        };
        for output in &outputs {
            log::debug!(
                "Model {} top prediction: {:?}",
                output.model_name,
                output.predictions.first().map(|p| p.label.as_str())
            );
        }

        let scores: Vec<_> = outputs
            .iter()
            .map(|output| scoring::score(&output.predictions))
            .collect();

        match scoring::aggregate(&scores) {
            Ok(decision) => Some(decision),
            Err(e) => {
                warn!("Ensemble aggregation failed: {}", e);
                None
            }
        }
    }
}

pub fn decode_image(image_bytes: &[u8]) -> Result<RgbImage, ClassifyError> {
    Ok(image::load_from_memory(image_bytes)?.to_rgb8())
}

/// Ordered enrichment candidates: the routed label first, then web-entity
/// descriptions, deduplicated case-insensitively.
fn enrichment_candidates(primary_label: &str, entities: &[String]) -> Vec<String> {
    let mut candidates = vec![primary_label.to_string()];
    for entity in entities {
        let entity = entity.trim();
        if entity.is_empty() {
            continue;
        }
        if candidates
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(entity))
        {
            continue;
        }
        candidates.push(entity.to_string());
        if candidates.len() == wikipedia_service::MAX_CANDIDATES {
            break;
        }
    }
    candidates
}

fn auxiliary_map(aux: AuxiliaryDetails, decision: Option<&EnsembleDecision>) -> Map<String, Value> {
    let mut map = aux.details;
    if let Some(decision) = decision {
        map.insert(
            "pre_classification".to_string(),
            json!({
                "category": decision.category,
                "confidence": decision.confidence,
                "per_model_scores": decision.per_model_scores,
            }),
        );
    }
    map
}
