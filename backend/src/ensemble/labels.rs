use log::warn;
use std::path::Path;
use std::time::Duration;

use crate::ensemble::config::LabelsConfig;

/// The ensemble models share one fixed-size label vocabulary.
pub const VOCABULARY_SIZE: usize = 1000;

/// Sentinel for a model index that falls outside the vocabulary.
pub const UNKNOWN_LABEL: &str = "unknown";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Loads the shared vocabulary: local file first, then the canonical list
/// over HTTP, then numeric placeholders. Never fails; a degraded vocabulary
/// only weakens keyword scoring.
pub async fn load_vocabulary(
    config: &LabelsConfig,
    http: &reqwest::Client,
    root: &Path,
) -> Vec<String> {
    let path = root.join(&config.path);
    match read_labels_file(&path) {
        Ok(labels) => return labels,
        Err(e) => warn!("Label file unusable: {}", e),
    }

    match fetch_labels(http, &config.fetch_url).await {
        Ok(labels) => return labels,
        Err(e) => warn!("Label fetch from {} failed: {}", config.fetch_url, e),
    }

    warn!("Falling back to numeric labels; keyword scoring will be inert");
    numeric_fallback()
}

pub fn read_labels_file(path: &Path) -> Result<Vec<String>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_labels(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

async fn fetch_labels(http: &reqwest::Client, url: &str) -> Result<Vec<String>, String> {
    let response = http
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("unexpected status {}", response.status()));
    }
    let body = response.text().await.map_err(|e| e.to_string())?;
    parse_labels(&body)
}

fn parse_labels(content: &str) -> Result<Vec<String>, String> {
    let labels: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    if labels.len() != VOCABULARY_SIZE {
        return Err(format!(
            "expected {} labels, found {}",
            VOCABULARY_SIZE,
            labels.len()
        ));
    }
    Ok(labels)
}

pub fn numeric_fallback() -> Vec<String> {
    (0..VOCABULARY_SIZE).map(|i| i.to_string()).collect()
}

/// Resolves a class index, substituting the sentinel for anything out of
/// range instead of failing the whole prediction.
pub fn label_at(labels: &[String], index: usize) -> &str {
    labels
        .get(index)
        .map(String::as_str)
        .unwrap_or(UNKNOWN_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_complete_label_file() {
        let mut file = NamedTempFile::new().unwrap();
        for i in 0..VOCABULARY_SIZE {
            writeln!(file, "class {}", i).unwrap();
        }
        let labels = read_labels_file(file.path()).unwrap();
        assert_eq!(labels.len(), VOCABULARY_SIZE);
        assert_eq!(labels[0], "class 0");
        assert_eq!(labels[999], "class 999");
    }

    #[test]
    fn rejects_truncated_label_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "goldfish").unwrap();
        writeln!(file, "tench").unwrap();
        assert!(read_labels_file(file.path()).is_err());
    }

    #[test]
    fn rejects_missing_file() {
        assert!(read_labels_file(Path::new("/nonexistent/labels.txt")).is_err());
    }

    #[test]
    fn numeric_fallback_is_full_size() {
        let labels = numeric_fallback();
        assert_eq!(labels.len(), VOCABULARY_SIZE);
        assert_eq!(labels[42], "42");
    }

    #[test]
    fn out_of_range_index_maps_to_sentinel() {
        let labels = vec!["tabby".to_string(), "tiger".to_string()];
        assert_eq!(label_at(&labels, 1), "tiger");
        assert_eq!(label_at(&labels, 2), UNKNOWN_LABEL);
        assert_eq!(label_at(&labels, usize::MAX), UNKNOWN_LABEL);
    }
}
