use log::debug;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::providers::{PlantProvider, PlantSuggestion, ProviderError};
use shared::ProviderResult;

const PROVIDER: &str = "plantnet";
const DEFAULT_ENDPOINT: &str = "https://my-api.plantnet.org/v2/identify/all";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// PlantNet identify adapter. Runs without a credential in degraded mode:
/// `identify` reports no suggestion instead of erroring, so the router
/// falls through to the general provider.
pub struct PlantNetService {
    http: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl PlantNetService {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl PlantProvider for PlantNetService {
    async fn identify(&self, image: &[u8]) -> Result<Option<PlantSuggestion>, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!("PLANTNET_API_KEY is not configured; skipping plant specialist");
            return Ok(None);
        };

        let part = Part::bytes(image.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().part("images", part).text("organs", "auto");

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("api-key", api_key)])
            .multipart(form)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        // PlantNet answers 404 when nothing in the flora matched.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable {
                provider: PROVIDER,
                reason: format!("identify failed with {}: {}", status, error_text),
            });
        }

        let parsed: IdentifyResponse = response.json().await?;
        Ok(top_suggestion(parsed))
    }
}

fn top_suggestion(response: IdentifyResponse) -> Option<PlantSuggestion> {
    response
        .results
        .into_iter()
        .find(|result| !result.species.scientific_name_without_author.is_empty())
        .map(|result| PlantSuggestion {
            scientific_name: result.species.scientific_name_without_author,
            common_names: result.species.common_names,
            score: result.score,
        })
}

/// Canonical result for a specialist suggestion: the scientific name is the
/// label, common names ride along as auxiliary data.
pub fn suggestion_result(suggestion: &PlantSuggestion) -> ProviderResult {
    let mut result = ProviderResult::empty();
    result.label = Some(suggestion.scientific_name.clone());
    result.confidence = Some(suggestion.score);
    result.source = Some(PROVIDER.to_string());
    if !suggestion.common_names.is_empty() {
        result
            .extra
            .insert("common_names".to_string(), json!(suggestion.common_names));
    }
    result
}

#[derive(Debug, Default, Deserialize)]
struct IdentifyResponse {
    #[serde(default)]
    results: Vec<IdentifyMatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IdentifyMatch {
    score: f32,
    species: IdentifySpecies,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IdentifySpecies {
    scientific_name_without_author: String,
    common_names: Vec<String>,
}
