pub mod error;
pub mod types;

pub use error::{Result, SpiderCloudError};
pub use types::{RequestMode, ScrapeParams, SelectorSpec, SpiderEvent, WaitForSelector};

use futures::StreamExt;
use serde_json::Value;

const BASE_URL: &str = "https://api.spider.cloud/v1";

/// Client for the SpiderCloud crawl API. Responses stream back as JSONL
/// events which are folded into `SpiderEvent`s line by line.
pub struct SpiderClient {
    client: reqwest::Client,
    api_key: String,
}

impl SpiderClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    pub fn with_timeout(api_key: String, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SpiderCloudError::Network(e.to_string()))?;
        Ok(Self { client, api_key })
    }

    /// Scrape one URL, streaming the JSONL response. Returns every event
    /// in arrival order; content extraction is the caller's concern.
    pub async fn scrape_url(&self, url: &str, params: &ScrapeParams) -> Result<Vec<SpiderEvent>> {
        let mut body = serde_json::to_value(params)?;
        if let Value::Object(map) = &mut body {
            map.insert("url".into(), Value::String(url.to_string()));
        }

        let resp = self
            .client
            .post(format!("{BASE_URL}/crawl"))
            .bearer_auth(&self.api_key)
            .header("content-type", "application/jsonl")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SpiderCloudError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut events = Vec::new();
        let mut buffer = String::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(idx) = buffer.find('\n') {
                let line = buffer[..idx].trim().to_string();
                buffer.drain(..=idx);
                if line.is_empty() {
                    continue;
                }
                events.push(parse_event_line(&line));
            }
        }
        let tail = buffer.trim();
        if !tail.is_empty() {
            events.push(parse_event_line(tail));
        }

        tracing::debug!(url, events = events.len(), "SpiderCloud stream finished");
        Ok(events)
    }

    /// Non-streaming fallback for the odd endpoint that refuses JSONL.
    pub async fn scrape_url_json(&self, url: &str, params: &ScrapeParams) -> Result<Vec<SpiderEvent>> {
        let mut body = serde_json::to_value(params)?;
        if let Value::Object(map) = &mut body {
            map.insert("url".into(), Value::String(url.to_string()));
        }

        let resp = self
            .client
            .post(format!("{BASE_URL}/crawl"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SpiderCloudError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let value: Value = resp.json().await?;
        let events = match value {
            Value::Array(items) => items.into_iter().map(SpiderEvent::from_value).collect(),
            other => vec![SpiderEvent::from_value(other)],
        };
        Ok(events)
    }
}

fn parse_event_line(line: &str) -> SpiderEvent {
    match serde_json::from_str::<Value>(line) {
        Ok(value) => SpiderEvent::from_value(value),
        Err(_) => SpiderEvent {
            markdown: Some(line.to_string()),
            ..SpiderEvent::default()
        },
    }
}
