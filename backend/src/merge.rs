use serde_json::{Map, Value, json};

use shared::{EnrichmentRecord, ProviderResult};

const ENRICHED_SOURCE_SUFFIX: &str = " + wikipedia";

/// Combines the primary provider result with enrichment metadata and
/// auxiliary details. Enrichment may override the display label; auxiliary
/// keys are additive and never replace anything the primary provider set.
pub fn merge(
    mut primary: ProviderResult,
    enrichment: Option<EnrichmentRecord>,
    auxiliary: Option<Map<String, Value>>,
) -> ProviderResult {
    if let Some(record) = enrichment {
        if let Some(label) = display_label(&record) {
            primary.label = Some(label);
        }
        primary.source = Some(match primary.source.take() {
            Some(source) => format!("{}{}", source, ENRICHED_SOURCE_SUFFIX),
            None => "wikipedia".to_string(),
        });
        primary.extra.entry("wikipedia".to_string()).or_insert(json!({
            "page_title": record.page_title,
            "summary": record.summary,
            "external_id": record.external_id,
            "scientific_name": record.scientific_name,
            "reference_url": record.reference_url,
        }));
    }

    if let Some(auxiliary) = auxiliary {
        for (key, value) in auxiliary {
            primary.extra.entry(key).or_insert(value);
        }
    }

    primary
}

/// Label override policy: scientific name first (with the page title in
/// parentheses when one exists), then the page title alone, otherwise no
/// override at all.
fn display_label(record: &EnrichmentRecord) -> Option<String> {
    let scientific = record
        .scientific_name
        .as_deref()
        .filter(|name| !name.is_empty());
    let title = Some(record.page_title.as_str()).filter(|title| !title.is_empty());

    match (scientific, title) {
        (Some(scientific), Some(title)) => Some(format!("{} ({})", scientific, title)),
        (Some(scientific), None) => Some(scientific.to_string()),
        (None, Some(title)) => Some(title.to_string()),
        (None, None) => None,
    }
}
