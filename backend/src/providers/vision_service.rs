use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::providers::{
    DetectedObject, DominantColor, ProviderError, VisionLabel, VisionProvider, WebDetection,
};
use shared::ProviderResult;

const PROVIDER: &str = "google_vision";
const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_RESULTS: u32 = 10;

/// Confidence assigned to a web-detection best guess, which carries no
/// score of its own.
const WEB_GUESS_CONFIDENCE: f32 = 0.5;

/// Google Cloud Vision REST adapter. Every capability is one annotate
/// request with a single feature, so failures stay independent.
pub struct VisionService {
    http: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl VisionService {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    async fn annotate(
        &self,
        image: &[u8],
        feature: &str,
        max_results: u32,
    ) -> Result<AnnotationResult, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unavailable {
                provider: PROVIDER,
                reason: "GOOGLE_VISION_API_KEY is not configured".to_string(),
            })?;

        let body = json!({
            "requests": [{
                "image": { "content": BASE64.encode(image) },
                "features": [{ "type": feature, "maxResults": max_results }]
            }]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable {
                provider: PROVIDER,
                reason: format!("{} request failed with {}: {}", feature, status, error_text),
            });
        }

        let mut parsed: AnnotateResponse = response.json().await?;
        let result = if parsed.responses.is_empty() {
            AnnotationResult::default()
        } else {
            parsed.responses.swap_remove(0)
        };

        if let Some(error) = &result.error {
            return Err(ProviderError::Unavailable {
                provider: PROVIDER,
                reason: format!("{} annotation error: {}", feature, error.message),
            });
        }
        Ok(result)
    }
}

impl VisionProvider for VisionService {
    async fn detect_labels(&self, image: &[u8]) -> Result<Vec<VisionLabel>, ProviderError> {
        let result = self.annotate(image, "LABEL_DETECTION", MAX_RESULTS).await?;
        Ok(result
            .label_annotations
            .into_iter()
            .filter(|label| !label.description.is_empty())
            .map(|label| VisionLabel {
                description: label.description,
                score: label.score,
            })
            .collect())
    }

    async fn detect_web_entities(&self, image: &[u8]) -> Result<WebDetection, ProviderError> {
        let result = self.annotate(image, "WEB_DETECTION", MAX_RESULTS).await?;
        let web = result.web_detection.unwrap_or_default();
        Ok(WebDetection {
            entities: web
                .web_entities
                .into_iter()
                .filter_map(|entity| {
                    entity.description.filter(|d| !d.is_empty()).map(|description| VisionLabel {
                        description,
                        score: entity.score,
                    })
                })
                .collect(),
            best_guess: web
                .best_guess_labels
                .into_iter()
                .map(|guess| guess.label)
                .find(|label| !label.is_empty()),
        })
    }

    async fn detect_objects(&self, image: &[u8]) -> Result<Vec<DetectedObject>, ProviderError> {
        let result = self
            .annotate(image, "OBJECT_LOCALIZATION", MAX_RESULTS)
            .await?;
        Ok(result
            .localized_object_annotations
            .into_iter()
            .map(|object| DetectedObject {
                name: object.name,
                score: object.score,
                bounding_box: object
                    .bounding_poly
                    .map(|poly| {
                        poly.normalized_vertices
                            .into_iter()
                            .map(|vertex| [vertex.x, vertex.y])
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn detect_text(&self, image: &[u8]) -> Result<Option<String>, ProviderError> {
        let result = self.annotate(image, "TEXT_DETECTION", 1).await?;
        Ok(result
            .full_text_annotation
            .map(|annotation| annotation.text.trim().to_string())
            .filter(|text| !text.is_empty()))
    }

    async fn detect_properties(&self, image: &[u8]) -> Result<Vec<DominantColor>, ProviderError> {
        let result = self.annotate(image, "IMAGE_PROPERTIES", 1).await?;
        Ok(result
            .image_properties_annotation
            .and_then(|properties| properties.dominant_colors)
            .map(|dominant| {
                dominant
                    .colors
                    .into_iter()
                    .map(|info| DominantColor {
                        red: info.color.red,
                        green: info.color.green,
                        blue: info.color.blue,
                        pixel_fraction: info.pixel_fraction,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Normalizes label detection into the canonical result: the top label
/// wins as-is.
pub fn label_result(labels: &[VisionLabel]) -> Option<ProviderResult> {
    let top = labels.first()?;
    let mut result = ProviderResult::empty();
    result.label = Some(top.description.clone());
    result.confidence = Some(top.score);
    result.source = Some("google_vision_labels".to_string());
    Some(result)
}

/// Normalizes a web-detection best guess, used only when label detection
/// came back empty.
pub fn web_result(web: &WebDetection) -> Option<ProviderResult> {
    let guess = web.best_guess.as_deref()?;
    let mut result = ProviderResult::empty();
    result.label = Some(guess.to_string());
    result.confidence = Some(WEB_GUESS_CONFIDENCE);
    result.source = Some("google_vision_web".to_string());
    Some(result)
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotationResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AnnotationResult {
    label_annotations: Vec<WireLabel>,
    web_detection: Option<WireWebDetection>,
    localized_object_annotations: Vec<WireObject>,
    full_text_annotation: Option<WireText>,
    image_properties_annotation: Option<WireProperties>,
    error: Option<WireStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct WireLabel {
    #[serde(default)]
    description: String,
    #[serde(default)]
    score: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireWebDetection {
    web_entities: Vec<WireEntity>,
    best_guess_labels: Vec<WireBestGuess>,
}

#[derive(Debug, Default, Deserialize)]
struct WireEntity {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    score: f32,
}

#[derive(Debug, Default, Deserialize)]
struct WireBestGuess {
    #[serde(default)]
    label: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireObject {
    name: String,
    score: f32,
    bounding_poly: Option<WirePoly>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WirePoly {
    normalized_vertices: Vec<WireVertex>,
}

#[derive(Debug, Default, Deserialize)]
struct WireVertex {
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
}

#[derive(Debug, Default, Deserialize)]
struct WireText {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireProperties {
    dominant_colors: Option<WireDominantColors>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDominantColors {
    #[serde(default)]
    colors: Vec<WireColorInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireColorInfo {
    color: WireColor,
    pixel_fraction: f32,
}

#[derive(Debug, Default, Deserialize)]
struct WireColor {
    #[serde(default)]
    red: f32,
    #[serde(default)]
    green: f32,
    #[serde(default)]
    blue: f32,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_label_annotations() {
        let body = r#"{
            "responses": [{
                "labelAnnotations": [
                    { "description": "Dog", "score": 0.97 },
                    { "description": "Golden Retriever", "score": 0.92 }
                ]
            }]
        }"#;
        let parsed: AnnotateResponse = serde_json::from_str(body).unwrap();
        let labels = &parsed.responses[0].label_annotations;
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].description, "Dog");
        assert!((labels[0].score - 0.97).abs() < 1e-6);
    }

    #[test]
    fn parses_web_detection_with_missing_fields() {
        let body = r#"{
            "responses": [{
                "webDetection": {
                    "webEntities": [
                        { "description": "Rosa chinensis", "score": 1.2 },
                        { "score": 0.4 }
                    ],
                    "bestGuessLabels": [{ "label": "china rose" }]
                }
            }]
        }"#;
        let parsed: AnnotateResponse = serde_json::from_str(body).unwrap();
        let web = parsed.responses[0].web_detection.as_ref().unwrap();
        assert_eq!(web.web_entities.len(), 2);
        assert!(web.web_entities[1].description.is_none());
        assert_eq!(web.best_guess_labels[0].label, "china rose");
    }

    #[test]
    fn parses_annotation_error() {
        let body = r#"{"responses": [{"error": {"message": "quota exceeded"}}]}"#;
        let parsed: AnnotateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.responses[0].error.as_ref().unwrap().message,
            "quota exceeded"
        );
    }

    #[test]
    fn top_label_becomes_canonical_result() {
        let labels = vec![
            VisionLabel { description: "Dog".into(), score: 0.95 },
            VisionLabel { description: "Mammal".into(), score: 0.90 },
        ];
        let result = label_result(&labels).unwrap();
        assert_eq!(result.label.as_deref(), Some("Dog"));
        assert_eq!(result.confidence, Some(0.95));
        assert_eq!(result.source.as_deref(), Some("google_vision_labels"));
        assert!(result.error.is_none());
        assert!(result.is_usable());
    }

    #[test]
    fn empty_labels_produce_no_result() {
        assert!(label_result(&[]).is_none());
    }

    #[test]
    fn best_guess_result_uses_fixed_confidence() {
        let web = WebDetection {
            entities: vec![],
            best_guess: Some("china rose".into()),
        };
        let result = web_result(&web).unwrap();
        assert_eq!(result.label.as_deref(), Some("china rose"));
        assert_eq!(result.confidence, Some(WEB_GUESS_CONFIDENCE));
        assert_eq!(result.source.as_deref(), Some("google_vision_web"));
    }

    #[test]
    fn no_best_guess_produces_no_result() {
        assert!(web_result(&WebDetection::default()).is_none());
    }
}
