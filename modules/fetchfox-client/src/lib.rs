pub mod error;

pub use error::{FetchFoxError, Result};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const BASE_URL: &str = "https://api.fetchfox.ai";

/// Hard ceiling on pages visited per crawl request. Enforced here so no
/// configuration path can push past it.
pub const MAX_VISITS: u32 = 20;

/// Skip list handed to the crawler so it never revisits known URLs.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Priority {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
}

/// A template-driven scrape request. `template` maps output field names
/// to type hints the extraction model fills in.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ScrapeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub start_urls: Vec<String>,
    pub max_depth: u32,
    pub max_visits: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub template: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_transform: Option<String>,
}

impl ScrapeRequest {
    /// Clamp the visit budget. Every request passes through here before
    /// leaving the client.
    pub fn clamped(mut self) -> Self {
        self.max_visits = self.max_visits.min(MAX_VISITS);
        self
    }
}

/// Crawl-only request (no extraction template).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CrawlRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub start_urls: Vec<String>,
    pub max_depth: u32,
    pub max_visits: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl CrawlRequest {
    pub fn clamped(mut self) -> Self {
        self.max_visits = self.max_visits.min(MAX_VISITS);
        self
    }
}

/// Client for the FetchFox template crawler.
pub struct FetchFoxClient {
    client: reqwest::Client,
    api_key: String,
}

impl FetchFoxClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Run a template scrape. The result shape varies per template, so
    /// callers get the raw JSON back.
    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<Value> {
        let request = request.clone().clamped();
        tracing::info!(
            start_urls = request.start_urls.len(),
            max_visits = request.max_visits,
            "FetchFox scrape dispatch"
        );
        self.post("/scrape", &serde_json::to_value(&request)?).await
    }

    /// Run a crawl that only discovers URLs.
    pub async fn crawl(&self, request: &CrawlRequest) -> Result<Value> {
        let request = request.clone().clamped();
        tracing::info!(
            start_urls = request.start_urls.len(),
            max_visits = request.max_visits,
            "FetchFox crawl dispatch"
        );
        self.post("/crawl", &serde_json::to_value(&request)?).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(format!("{BASE_URL}{path}"))
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FetchFoxError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            // Some endpoints return bare text bodies on partial results.
            Err(_) => {
                let mut map = Map::new();
                map.insert("raw".into(), Value::String(text));
                Ok(Value::Object(map))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visit_cap_is_enforced() {
        let request = ScrapeRequest {
            start_urls: vec!["https://example.com".into()],
            max_depth: 5,
            max_visits: 500,
            ..ScrapeRequest::default()
        }
        .clamped();
        assert_eq!(request.max_visits, MAX_VISITS);

        let crawl = CrawlRequest {
            start_urls: vec!["https://example.com".into()],
            max_depth: 5,
            max_visits: 21,
            ..CrawlRequest::default()
        }
        .clamped();
        assert_eq!(crawl.max_visits, MAX_VISITS);
    }

    #[test]
    fn empty_priority_skip_is_serialized_sparsely() {
        let request = ScrapeRequest {
            start_urls: vec!["https://example.com".into()],
            max_depth: 1,
            max_visits: 1,
            priority: Some(Priority { skip: vec![] }),
            ..ScrapeRequest::default()
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value["priority"].get("skip").is_none());
        assert!(value.get("pattern").is_none());
    }
}
