//! Default implementations of the agent's external collaborators: an
//! in-memory knowledge store and a DuckDuckGo-backed web search.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use econ_agent::tools::{KnowledgeStore, SearchProvider};

/// National statistics and major institutional sources rank above everything
/// else in search output.
const OFFICIAL_SOURCES: &[&str] = &["statistica.gov.md", "gov.md", "bnm.md"];
const INSTITUTIONAL_SOURCES: &[&str] =
    &["worldbank.org", "imf.org", "oecd.org", "un.org", "ec.europa.eu", "eurostat"];

#[derive(Debug)]
struct KnowledgeEntry {
    topic: String,
    content: String,
    source: String,
}

/// Process-lifetime knowledge store. Facts are deduplicated by a content
/// hash so repeated recovery cycles do not pile up copies.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    entries: Mutex<HashMap<String, KnowledgeEntry>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All facts recorded under a topic, most useful for inspection and
    /// follow-up prompts. Each line carries the fact and where it came from.
    pub fn facts_for(&self, topic: &str) -> Vec<String> {
        let needle = topic.trim().to_lowercase();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .values()
            .filter(|entry| entry.topic.trim().to_lowercase() == needle)
            .map(|entry| format!("{} (source: {})", entry.content, entry.source))
            .collect()
    }

    fn fingerprint(topic: &str, content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(topic.trim().to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(content.trim().as_bytes());
        let digest = hasher.finalize();
        digest.iter().take(8).map(|byte| format!("{byte:02x}")).collect()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn add(&self, topic: &str, content: &str, source: &str) -> Result<bool> {
        let key = Self::fingerprint(topic, content);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&key) {
            return Ok(false);
        }
        entries.insert(
            key,
            KnowledgeEntry {
                topic: topic.to_string(),
                content: content.to_string(),
                source: source.to_string(),
            },
        );
        Ok(true)
    }

    /// Keyword-overlap ranking: each entry scores one point per query word
    /// found in its topic or content, topic hits counting double.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        let words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|word| word.len() > 2)
            .map(str::to_string)
            .collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<(usize, String)> = entries
            .values()
            .filter_map(|entry| {
                let topic = entry.topic.to_lowercase();
                let content = entry.content.to_lowercase();
                let score: usize = words
                    .iter()
                    .map(|word| {
                        2 * usize::from(topic.contains(word.as_str()))
                            + usize::from(content.contains(word.as_str()))
                    })
                    .sum();
                (score > 0)
                    .then(|| (score, format!("{} (source: {})", entry.content, entry.source)))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(top_k).map(|(_, line)| line).collect())
    }

    async fn count(&self) -> Result<usize> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.len())
    }
}

/// Web search over the DuckDuckGo instant-answer API.
pub struct DuckDuckGoSearch {
    http: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("could not build http client")?;
        Ok(Self { http, endpoint: "https://api.duckduckgo.com".to_string() })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<String> {
        debug!(event_name = "search.request", query, "querying duckduckgo");
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .context("search request failed")?;
        let payload: Value = response.json().await.context("search response was not JSON")?;
        let results = format_results(&payload);
        if results.is_empty() {
            Ok(format!("No web results found for '{query}'."))
        } else {
            Ok(results)
        }
    }
}

/// Source credibility tier; lower sorts first.
fn source_tier(url: &str) -> u8 {
    let lowered = url.to_lowercase();
    if OFFICIAL_SOURCES.iter().any(|domain| lowered.contains(domain)) {
        0
    } else if INSTITUTIONAL_SOURCES.iter().any(|domain| lowered.contains(domain)) {
        1
    } else {
        2
    }
}

fn tier_label(tier: u8) -> &'static str {
    match tier {
        0 => " [official source]",
        1 => " [institutional source]",
        _ => "",
    }
}

/// Flatten the instant-answer payload into ranked result lines.
fn format_results(payload: &Value) -> String {
    let mut entries: Vec<(u8, String)> = Vec::new();

    let abstract_text = payload.get("AbstractText").and_then(Value::as_str).unwrap_or("");
    if !abstract_text.is_empty() {
        let url = payload.get("AbstractURL").and_then(Value::as_str).unwrap_or("");
        let tier = source_tier(url);
        entries.push((tier, format!("{abstract_text} ({url}){}", tier_label(tier))));
    }

    if let Some(topics) = payload.get("RelatedTopics").and_then(Value::as_array) {
        for topic in topics.iter().take(5) {
            let text = topic.get("Text").and_then(Value::as_str).unwrap_or("");
            if text.is_empty() {
                continue;
            }
            let url = topic.get("FirstURL").and_then(Value::as_str).unwrap_or("");
            let tier = source_tier(url);
            entries.push((tier, format!("{text} ({url}){}", tier_label(tier))));
        }
    }

    entries.sort_by_key(|(tier, _)| *tier);
    entries
        .into_iter()
        .enumerate()
        .map(|(index, (_, line))| format!("{}. {line}", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use econ_agent::tools::KnowledgeStore;

    use super::{format_results, source_tier, InMemoryKnowledgeStore};

    #[tokio::test]
    async fn duplicate_facts_are_not_stored_twice() {
        let store = InMemoryKnowledgeStore::new();
        assert!(store.add("inflation", "CPI rose 5.2% in 2024", "web").await.expect("add"));
        assert!(!store.add("inflation", "CPI rose 5.2% in 2024", "web").await.expect("add"));
        assert_eq!(store.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn different_content_under_same_topic_is_kept() {
        let store = InMemoryKnowledgeStore::new();
        store.add("gdp", "GDP grew 4% in 2023", "web").await.expect("add");
        store.add("gdp", "GDP grew 2% in 2024", "web").await.expect("add");
        assert_eq!(store.count().await.expect("count"), 2);

        let facts = store.facts_for("GDP");
        assert_eq!(facts.len(), 2);
        assert!(facts.iter().all(|fact| fact.ends_with("(source: web)")));
    }

    #[tokio::test]
    async fn search_ranks_topic_matches_first() {
        let store = InMemoryKnowledgeStore::new();
        store.add("inflation", "CPI rose 5.2% in 2024", "web").await.expect("add");
        store.add("gdp", "GDP per capita mentions inflation pressure", "web").await.expect("add");
        store.add("wages", "Average wage reached 12000 lei", "web").await.expect("add");

        let hits = store.search("inflation trend", 2).await.expect("search");
        assert_eq!(hits.len(), 2);
        assert!(hits[0].starts_with("CPI rose"));

        assert!(store.search("?!", 5).await.expect("search").is_empty());
    }

    #[test]
    fn official_sources_outrank_everything() {
        assert_eq!(source_tier("https://statistica.gov.md/ro/trade"), 0);
        assert_eq!(source_tier("https://data.worldbank.org/country"), 1);
        assert_eq!(source_tier("https://example-blog.com/post"), 2);
    }

    #[test]
    fn results_are_sorted_by_source_tier() {
        let payload = json!({
            "AbstractText": "Some blog summary",
            "AbstractURL": "https://example-blog.com/trade",
            "RelatedTopics": [
                {"Text": "Official trade statistics", "FirstURL": "https://statistica.gov.md/trade"},
                {"Text": "World Bank overview", "FirstURL": "https://worldbank.org/md"}
            ]
        });
        let formatted = format_results(&payload);
        let lines: Vec<&str> = formatted.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("[official source]"));
        assert!(lines[1].contains("[institutional source]"));
        assert!(lines[2].contains("example-blog.com"));
    }

    #[test]
    fn empty_payload_formats_to_nothing() {
        assert!(format_results(&json!({})).is_empty());
    }
}
