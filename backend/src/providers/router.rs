use log::{debug, info, warn};
use serde_json::{Map, Value, json};

use crate::ensemble::scoring;
use crate::providers::{
    PlantProvider, ProviderError, VisionProvider, plantnet_service, vision_service,
};
use shared::{EnsembleDecision, ProviderResult, SpeciesCategory};

pub const NO_PROVIDER_ERROR: &str = "no provider could classify the image";

/// Best-effort context gathered while the general provider is consulted.
/// Feeds the `extra` mapping and the enrichment candidate list; never
/// affects whether a result is usable.
#[derive(Default)]
pub struct AuxiliaryDetails {
    pub details: Map<String, Value>,
    pub entity_candidates: Vec<String>,
}

/// Orders provider calls from the ensemble decision and falls back across
/// them. Policy: one attempt per provider per request, no retries; a failed
/// call is "inconclusive" and the next stage runs.
pub struct ProviderRouter<P, V> {
    plant: P,
    vision: V,
}

impl<P: PlantProvider, V: VisionProvider> ProviderRouter<P, V> {
    pub fn new(plant: P, vision: V) -> Self {
        Self { plant, vision }
    }

    pub async fn route(
        &self,
        decision: Option<&EnsembleDecision>,
        image: &[u8],
    ) -> (ProviderResult, AuxiliaryDetails) {
        let mut aux = AuxiliaryDetails::default();
        let mut plant_attempted = false;

        // Stage 1: category-specific specialist.
        if decision.map(|d| d.category) == Some(SpeciesCategory::Plant) {
            plant_attempted = true;
            if let Some(result) = self.try_plant(image).await {
                return (result, aux);
            }
        }

        // Stages 2 and 3 collapse into a single attempt: the general
        // provider serves both the animal path and the universal fallback.
        let Some(result) = self.try_vision(image, &mut aux).await else {
            warn!("All providers exhausted without a usable result");
            return (terminal_result(), aux);
        };

        // Post-hoc correction: plant wording in the general result re-routes
        // to the specialist, unless it already had its one attempt.
        if !plant_attempted && has_plant_wording(&result, &aux) {
            info!("Plant keyword in general result; re-routing to specialist");
            if let Some(specialist) = self.try_plant(image).await {
                return (specialist, aux);
            }
        }

        (result, aux)
    }

    async fn try_plant(&self, image: &[u8]) -> Option<ProviderResult> {
        match self.plant.identify(image).await {
            Ok(Some(suggestion)) => {
                info!(
                    "Plant specialist suggested {} ({:.2})",
                    suggestion.scientific_name, suggestion.score
                );
                let result = plantnet_service::suggestion_result(&suggestion);
                result.is_usable().then_some(result)
            }
            Ok(None) => {
                info!("Plant specialist had no suggestion");
                None
            }
            Err(e) => {
                warn!("Plant specialist inconclusive: {}", e);
                None
            }
        }
    }

    async fn try_vision(
        &self,
        image: &[u8],
        aux: &mut AuxiliaryDetails,
    ) -> Option<ProviderResult> {
        let labels = match self.vision.detect_labels(image).await {
            Ok(labels) => labels,
            Err(e) => {
                warn!("Vision label detection inconclusive: {}", e);
                Vec::new()
            }
        };

        let web = match self.vision.detect_web_entities(image).await {
            Ok(web) => {
                aux.entity_candidates = web
                    .entities
                    .iter()
                    .map(|entity| entity.description.clone())
                    .collect();
                if !web.entities.is_empty() {
                    aux.details
                        .insert("web_entities".to_string(), json!(web.entities));
                }
                Some(web)
            }
            Err(e) => {
                debug!("Web entity detection skipped: {}", e);
                None
            }
        };

        self.gather_details(image, aux).await;

        if let Some(result) = vision_service::label_result(&labels) {
            info!(
                "General vision provider labeled the image as {:?}",
                result.label
            );
            return Some(result);
        }
        if let Some(result) = web.as_ref().and_then(vision_service::web_result) {
            info!("Falling back to web best guess {:?}", result.label);
            return Some(result);
        }

        warn!(
            "{}",
            ProviderError::NoSuggestion {
                provider: "google_vision"
            }
        );
        None
    }

    async fn gather_details(&self, image: &[u8], aux: &mut AuxiliaryDetails) {
        match self.vision.detect_properties(image).await {
            Ok(colors) if !colors.is_empty() => {
                aux.details
                    .insert("dominant_colors".to_string(), json!(colors));
            }
            Ok(_) => {}
            Err(e) => debug!("Color detection skipped: {}", e),
        }

        match self.vision.detect_text(image).await {
            Ok(Some(text)) => {
                aux.details.insert("detected_text".to_string(), json!(text));
            }
            Ok(None) => {}
            Err(e) => debug!("Text detection skipped: {}", e),
        }

        match self.vision.detect_objects(image).await {
            Ok(objects) if !objects.is_empty() => {
                aux.details.insert("objects".to_string(), json!(objects));
            }
            Ok(_) => {}
            Err(e) => debug!("Object detection skipped: {}", e),
        }
    }
}

fn has_plant_wording(result: &ProviderResult, aux: &AuxiliaryDetails) -> bool {
    result
        .label
        .as_deref()
        .is_some_and(scoring::mentions_plant)
        || aux
            .entity_candidates
            .iter()
            .any(|candidate| scoring::mentions_plant(candidate))
}

fn terminal_result() -> ProviderResult {
    let mut result = ProviderResult::empty();
    result.error = Some(NO_PROVIDER_ERROR.to_string());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        DetectedObject, DominantColor, PlantSuggestion, VisionLabel, WebDetection,
    };
    use shared::CategoryScore;
    use std::cell::Cell;

    struct StubPlant {
        suggestion: Option<PlantSuggestion>,
        fail: bool,
        calls: Cell<u32>,
    }

    impl StubPlant {
        fn with(suggestion: Option<PlantSuggestion>) -> Self {
            Self {
                suggestion,
                fail: false,
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                suggestion: None,
                fail: true,
                calls: Cell::new(0),
            }
        }
    }

    impl PlantProvider for StubPlant {
        async fn identify(&self, _: &[u8]) -> Result<Option<PlantSuggestion>, ProviderError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(ProviderError::Unavailable {
                    provider: "plantnet",
                    reason: "stub outage".to_string(),
                });
            }
            Ok(self.suggestion.clone())
        }
    }

    struct StubVision {
        labels: Vec<VisionLabel>,
        entities: Vec<String>,
        best_guess: Option<String>,
        label_calls: Cell<u32>,
    }

    impl StubVision {
        fn with_labels(labels: &[(&str, f32)]) -> Self {
            Self {
                labels: labels
                    .iter()
                    .map(|(description, score)| VisionLabel {
                        description: description.to_string(),
                        score: *score,
                    })
                    .collect(),
                entities: Vec::new(),
                best_guess: None,
                label_calls: Cell::new(0),
            }
        }

        fn empty() -> Self {
            Self::with_labels(&[])
        }
    }

    impl VisionProvider for StubVision {
        async fn detect_labels(&self, _: &[u8]) -> Result<Vec<VisionLabel>, ProviderError> {
            self.label_calls.set(self.label_calls.get() + 1);
            Ok(self.labels.clone())
        }

        async fn detect_web_entities(&self, _: &[u8]) -> Result<WebDetection, ProviderError> {
            Ok(WebDetection {
                entities: self
                    .entities
                    .iter()
                    .map(|description| VisionLabel {
                        description: description.clone(),
                        score: 0.5,
                    })
                    .collect(),
                best_guess: self.best_guess.clone(),
            })
        }

        async fn detect_objects(&self, _: &[u8]) -> Result<Vec<DetectedObject>, ProviderError> {
            Ok(Vec::new())
        }

        async fn detect_text(&self, _: &[u8]) -> Result<Option<String>, ProviderError> {
            Ok(None)
        }

        async fn detect_properties(&self, _: &[u8]) -> Result<Vec<DominantColor>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn decision(category: SpeciesCategory, confidence: f32) -> EnsembleDecision {
        EnsembleDecision {
            category,
            confidence,
            per_model_scores: vec![CategoryScore::default()],
        }
    }

    fn rosa() -> PlantSuggestion {
        PlantSuggestion {
            scientific_name: "Rosa chinensis".to_string(),
            common_names: vec!["China rose".to_string()],
            score: 0.9,
        }
    }

    #[actix_web::test]
    async fn plant_decision_prefers_specialist() {
        let router = ProviderRouter::new(
            StubPlant::with(Some(rosa())),
            StubVision::with_labels(&[("Golden Retriever", 0.95)]),
        );
        let hint = decision(SpeciesCategory::Plant, 0.8);
        let (result, _) = router.route(Some(&hint), &[0u8]).await;

        assert_eq!(result.label.as_deref(), Some("Rosa chinensis"));
        assert_eq!(result.source.as_deref(), Some("plantnet"));
        assert_eq!(router.vision.label_calls.get(), 0);
        assert_eq!(router.plant.calls.get(), 1);
    }

    #[actix_web::test]
    async fn plant_outage_falls_back_to_vision() {
        let router = ProviderRouter::new(
            StubPlant::failing(),
            StubVision::with_labels(&[("Moss", 0.7)]),
        );
        let hint = decision(SpeciesCategory::Plant, 0.9);
        let (result, _) = router.route(Some(&hint), &[0u8]).await;

        assert_eq!(result.label.as_deref(), Some("Moss"));
        assert_eq!(result.source.as_deref(), Some("google_vision_labels"));
        // The specialist had its single attempt in stage 1; the plant
        // wording in "Moss" must not re-route to it a second time.
        assert_eq!(router.plant.calls.get(), 1);
        assert_eq!(router.vision.label_calls.get(), 1);
    }

    #[actix_web::test]
    async fn animal_decision_skips_specialist() {
        let router = ProviderRouter::new(
            StubPlant::with(Some(rosa())),
            StubVision::with_labels(&[("Golden Retriever", 0.95)]),
        );
        let hint = decision(SpeciesCategory::Animal, 0.7);
        let (result, _) = router.route(Some(&hint), &[0u8]).await;

        assert_eq!(result.label.as_deref(), Some("Golden Retriever"));
        assert_eq!(router.plant.calls.get(), 0);
        assert_eq!(router.vision.label_calls.get(), 1);
    }

    #[actix_web::test]
    async fn missing_decision_still_routes_to_general_provider() {
        let router = ProviderRouter::new(
            StubPlant::with(None),
            StubVision::with_labels(&[("Mountain", 0.6)]),
        );
        let (result, _) = router.route(None, &[0u8]).await;

        assert_eq!(result.label.as_deref(), Some("Mountain"));
        assert_eq!(router.plant.calls.get(), 0);
    }

    #[actix_web::test]
    async fn exhausted_providers_yield_terminal_error() {
        let router = ProviderRouter::new(StubPlant::with(None), StubVision::empty());
        let hint = decision(SpeciesCategory::Plant, 0.6);
        let (result, _) = router.route(Some(&hint), &[0u8]).await;

        assert!(result.label.is_none());
        assert_eq!(result.error.as_deref(), Some(NO_PROVIDER_ERROR));
        assert_eq!(router.plant.calls.get(), 1);
        assert_eq!(router.vision.label_calls.get(), 1);
    }

    #[actix_web::test]
    async fn plant_wording_reroutes_to_specialist() {
        let router = ProviderRouter::new(
            StubPlant::with(Some(rosa())),
            StubVision::with_labels(&[("Rose", 0.85)]),
        );
        let hint = decision(SpeciesCategory::Animal, 0.55);
        let (result, _) = router.route(Some(&hint), &[0u8]).await;

        assert_eq!(result.label.as_deref(), Some("Rosa chinensis"));
        assert_eq!(result.source.as_deref(), Some("plantnet"));
        assert_eq!(router.plant.calls.get(), 1);
        assert_eq!(router.vision.label_calls.get(), 1);
    }

    #[actix_web::test]
    async fn reroute_keeps_general_result_when_specialist_is_empty() {
        let router = ProviderRouter::new(
            StubPlant::with(None),
            StubVision::with_labels(&[("Rose", 0.85)]),
        );
        let (result, _) = router.route(None, &[0u8]).await;

        assert_eq!(result.label.as_deref(), Some("Rose"));
        assert_eq!(result.source.as_deref(), Some("google_vision_labels"));
        assert_eq!(router.plant.calls.get(), 1);
    }

    #[actix_web::test]
    async fn web_entity_wording_can_trigger_reroute() {
        let mut vision = StubVision::with_labels(&[("Close-up", 0.9)]);
        vision.entities = vec!["Sunflower".to_string()];
        let router = ProviderRouter::new(StubPlant::with(Some(rosa())), vision);
        let (result, aux) = router.route(None, &[0u8]).await;

        assert_eq!(result.source.as_deref(), Some("plantnet"));
        assert_eq!(aux.entity_candidates, vec!["Sunflower".to_string()]);
    }

    #[actix_web::test]
    async fn best_guess_backfills_empty_labels() {
        let mut vision = StubVision::empty();
        vision.best_guess = Some("mountain landscape".to_string());
        let router = ProviderRouter::new(StubPlant::with(None), vision);
        let (result, _) = router.route(None, &[0u8]).await;

        assert_eq!(result.label.as_deref(), Some("mountain landscape"));
        assert_eq!(result.source.as_deref(), Some("google_vision_web"));
        assert_eq!(result.confidence, Some(0.5));
    }

    #[actix_web::test]
    async fn routing_is_idempotent_across_calls() {
        let router = ProviderRouter::new(
            StubPlant::with(Some(rosa())),
            StubVision::with_labels(&[("Rose", 0.85)]),
        );
        let (first, _) = router.route(None, &[0u8]).await;
        let (second, _) = router.route(None, &[0u8]).await;

        assert_eq!(first.label, second.label);
        assert_eq!(first.source, second.source);
    }
}
