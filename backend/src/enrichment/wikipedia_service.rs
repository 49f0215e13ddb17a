use log::debug;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::providers::ProviderError;
use shared::EnrichmentRecord;

const PROVIDER: &str = "wikipedia";
const SEARCH_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";
const SUMMARY_ENDPOINT: &str = "https://en.wikipedia.org/api/rest_v1/page/summary";
const WIKIDATA_ENDPOINT: &str = "https://www.wikidata.org/w/api.php";

/// Wikidata property holding the taxon's scientific name.
const TAXON_NAME_PROPERTY: &str = "P225";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest summary carried into a result.
pub const SUMMARY_LIMIT: usize = 800;

/// Enrichment candidates scanned per classification.
pub const MAX_CANDIDATES: usize = 4;

/// Encyclopedic lookup: MediaWiki search, REST page summary, and a Wikidata
/// claim query for the scientific name. Everything here is best-effort;
/// the pipeline works without it.
pub struct WikipediaService {
    http: reqwest::Client,
}

impl WikipediaService {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Scans candidates in order and returns the best record found:
    /// a scientific name wins outright, a multi-word or parenthesized page
    /// title is trusted next, and otherwise the first successful lookup
    /// serves as the fallback.
    pub async fn enrich(&self, candidates: &[String]) -> Option<EnrichmentRecord> {
        let mut fallback: Option<EnrichmentRecord> = None;

        for candidate in candidates
            .iter()
            .map(|candidate| candidate.trim())
            .filter(|candidate| !candidate.is_empty())
            .take(MAX_CANDIDATES)
        {
            match self.lookup(candidate).await {
                Ok(record) => {
                    if record.scientific_name.is_some() {
                        return Some(record);
                    }
                    if looks_like_named_entity(&record.page_title) {
                        return Some(record);
                    }
                    if fallback.is_none() {
                        fallback = Some(record);
                    }
                }
                Err(e) => debug!("Enrichment lookup for '{}' failed: {}", candidate, e),
            }
        }

        fallback
    }

    async fn lookup(&self, query: &str) -> Result<EnrichmentRecord, ProviderError> {
        let title = self.search(query).await?;
        let summary = self.page_summary(&title).await?;

        let scientific_name = match summary.wikibase_item.as_deref() {
            Some(entity_id) => self.taxon_name(entity_id).await.unwrap_or_else(|e| {
                debug!("Taxon lookup for {} failed: {}", entity_id, e);
                None
            }),
            None => None,
        };

        let page_title = if summary.title.is_empty() {
            title.clone()
        } else {
            summary.title
        };
        let reference_url = summary.url.unwrap_or_else(|| {
            format!(
                "https://en.wikipedia.org/wiki/{}",
                urlencoding::encode(&page_title)
            )
        });

        Ok(EnrichmentRecord {
            page_title,
            summary: truncate_summary(&summary.extract),
            external_id: summary.wikibase_item,
            scientific_name,
            reference_url,
        })
    }

    async fn search(&self, query: &str) -> Result<String, ProviderError> {
        let response = self
            .http
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srlimit", "1"),
                ("format", "json"),
                ("srsearch", query),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable {
                provider: PROVIDER,
                reason: format!("search failed with {}", response.status()),
            });
        }

        let parsed: SearchResponse = response.json().await?;
        parsed
            .query
            .search
            .into_iter()
            .next()
            .map(|hit| hit.title)
            .ok_or(ProviderError::NoSuggestion { provider: PROVIDER })
    }

    async fn page_summary(&self, title: &str) -> Result<PageSummary, ProviderError> {
        let url = format!("{}/{}", SUMMARY_ENDPOINT, urlencoding::encode(title));
        let response = self
            .http
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable {
                provider: PROVIDER,
                reason: format!("summary for '{}' failed with {}", title, response.status()),
            });
        }

        let parsed: WireSummary = response.json().await?;
        Ok(PageSummary {
            title: parsed.title,
            extract: parsed.extract,
            wikibase_item: parsed.wikibase_item,
            url: parsed
                .content_urls
                .and_then(|urls| urls.desktop)
                .map(|desktop| desktop.page),
        })
    }

    async fn taxon_name(&self, entity_id: &str) -> Result<Option<String>, ProviderError> {
        let response = self
            .http
            .get(WIKIDATA_ENDPOINT)
            .query(&[
                ("action", "wbgetclaims"),
                ("entity", entity_id),
                ("property", TAXON_NAME_PROPERTY),
                ("format", "json"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable {
                provider: PROVIDER,
                reason: format!("claim query failed with {}", response.status()),
            });
        }

        let parsed: ClaimsResponse = response.json().await?;
        Ok(parsed
            .claims
            .get(TAXON_NAME_PROPERTY)
            .and_then(|claims| claims.first())
            .and_then(|claim| claim.mainsnak.datavalue.as_ref())
            .and_then(|datavalue| datavalue.value.as_str())
            .map(String::from))
    }
}

struct PageSummary {
    title: String,
    extract: String,
    wikibase_item: Option<String>,
    url: Option<String>,
}

/// Multi-word titles and parenthesized disambiguations read as real named
/// entities; bare single words are kept only as a fallback.
pub fn looks_like_named_entity(title: &str) -> bool {
    title.contains(' ') || title.contains('(')
}

pub fn truncate_summary(extract: &str) -> String {
    extract.chars().take(SUMMARY_LIMIT).collect()
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: SearchQuery,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireSummary {
    #[serde(default)]
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    wikibase_item: Option<String>,
    #[serde(default)]
    content_urls: Option<WireContentUrls>,
}

#[derive(Debug, Deserialize)]
struct WireContentUrls {
    desktop: Option<WirePageUrl>,
}

#[derive(Debug, Deserialize)]
struct WirePageUrl {
    page: String,
}

#[derive(Debug, Default, Deserialize)]
struct ClaimsResponse {
    #[serde(default)]
    claims: HashMap<String, Vec<WireClaim>>,
}

#[derive(Debug, Deserialize)]
struct WireClaim {
    mainsnak: WireSnak,
}

#[derive(Debug, Deserialize)]
struct WireSnak {
    datavalue: Option<WireDataValue>,
}

#[derive(Debug, Deserialize)]
struct WireDataValue {
    value: serde_json::Value,
}
