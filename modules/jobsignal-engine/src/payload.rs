//! Scrape payload DTOs and the size-budget trim stage. Every adapter
//! output passes through `trim_scrape_payload` before it leaves the
//! adapter, and again (possibly with the aggressive options) before the
//! record is persisted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::normalize::{floor_char_boundary, NormalizedJob};

pub const MAX_NORMALIZED_ITEMS: usize = 400;
pub const RAW_PREVIEW_CHARS: usize = 8_000;
pub const REQUEST_SNAPSHOT_CHARS: usize = 4_000;
pub const MAX_SEED_URLS: usize = 200;

/// Serializable view of the outbound provider request, with secrets
/// masked.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RequestSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// An ignored candidate carried inside scrape items until the storage
/// adapter records it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IgnoredItem {
    pub url: String,
    pub title: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The items block of a scrape payload.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeItems {
    #[serde(default)]
    pub normalized: Vec<NormalizedJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub job_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub existing: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<IgnoredItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_milli_cents: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One scrape cycle's output. Serialized as the scrape record body.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScrapePayload {
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub started_at: i64,
    pub completed_at: i64,
    pub items: ScrapeItems,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_milli_cents: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Trim knobs. `aggressive` is the retry configuration after the store
/// rejects a record.
#[derive(Debug, Clone, Copy)]
pub struct TrimOptions {
    pub max_items: usize,
    pub max_description: usize,
    pub raw_preview_chars: usize,
    pub request_max_chars: usize,
}

impl Default for TrimOptions {
    fn default() -> Self {
        Self {
            max_items: MAX_NORMALIZED_ITEMS,
            max_description: crate::normalize::MAX_DESCRIPTION_CHARS,
            raw_preview_chars: RAW_PREVIEW_CHARS,
            request_max_chars: REQUEST_SNAPSHOT_CHARS,
        }
    }
}

impl TrimOptions {
    pub fn aggressive() -> Self {
        Self {
            max_items: 100,
            max_description: 400,
            raw_preview_chars: 0,
            request_max_chars: 1_500,
        }
    }

    /// Shrink activity-sized payloads before returning per-URL scrapes.
    pub fn activity() -> Self {
        Self {
            max_items: 50,
            max_description: crate::normalize::MAX_DESCRIPTION_CHARS,
            raw_preview_chars: 2_000,
            request_max_chars: 1_500,
        }
    }
}

/// Lightly redact a secret while keeping its shape visible.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    if secret.len() <= 6 {
        return "*".repeat(secret.len());
    }
    format!("{}...{}", &secret[..4], &secret[secret.len() - 2..])
}

/// Mask string header values, keeping the header names visible.
pub fn sanitize_headers(headers: &Map<String, Value>) -> Map<String, Value> {
    let mut sanitized = Map::new();
    for (key, value) in headers {
        match value {
            Value::Null => {}
            Value::String(s) => {
                sanitized.insert(key.clone(), Value::String(mask_secret(s)));
            }
            other => {
                sanitized.insert(key.clone(), other.clone());
            }
        }
    }
    sanitized
}

/// Build the serializable request snapshot. Headers are sanitized here so
/// no secret ever reaches a scrape record.
pub fn build_request_snapshot(
    body: Value,
    provider: &str,
    method: &str,
    url: &str,
    headers: Map<String, Value>,
) -> RequestSnapshot {
    RequestSnapshot {
        method: Some(method.to_string()),
        url: Some(url.to_string()),
        body: Some(body),
        headers: if headers.is_empty() {
            None
        } else {
            Some(sanitize_headers(&headers))
        },
        provider: Some(provider.to_string()),
    }
}

/// Serialize a value and cap it at `max_chars`, replacing oversized
/// payloads with a truncated preview string.
pub fn shrink_payload(value: &Value, max_chars: usize) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let serialized = match serde_json::to_string(value) {
        Ok(s) => s,
        Err(_) => return Value::Null,
    };
    if serialized.len() <= max_chars {
        return value.clone();
    }
    let cut = floor_char_boundary(&serialized, max_chars);
    Value::String(format!(
        "{}... (+{} chars)",
        &serialized[..cut],
        serialized.len() - cut
    ))
}

fn trim_request_snapshot(snapshot: &RequestSnapshot, max_chars: usize) -> RequestSnapshot {
    let mut trimmed = snapshot.clone();
    if let Some(body) = &snapshot.body {
        trimmed.body = Some(shrink_payload(body, max_chars));
    }
    if let Some(headers) = &snapshot.headers {
        trimmed.headers = Some(sanitize_headers(headers));
    }
    trimmed
}

/// Trim a scrape to fit the store's record budget: cap rows, truncate
/// descriptions, reduce raw bodies to previews, shrink request/response
/// snapshots. Returns the trimmed payload and whether rows were dropped.
pub fn trim_scrape_payload(scrape: &ScrapePayload, options: &TrimOptions) -> (ScrapePayload, bool) {
    let mut trimmed = scrape.clone();
    let truncated = scrape.items.normalized.len() > options.max_items;

    trimmed.items.normalized = scrape
        .items
        .normalized
        .iter()
        .take(options.max_items)
        .cloned()
        .map(|mut row| {
            let cut = floor_char_boundary(&row.description, options.max_description);
            row.description.truncate(cut);
            row
        })
        .collect();

    trimmed.items.seed_urls.truncate(MAX_SEED_URLS);

    // Raw bodies never survive whole: they become a bounded preview, under
    // `rawPreview` when rows were also dropped.
    trimmed.items.raw = None;
    trimmed.items.raw_preview = None;
    if options.raw_preview_chars > 0 {
        if let Some(raw) = &scrape.items.raw {
            if let Ok(serialized) = serde_json::to_string(raw) {
                let cut = floor_char_boundary(&serialized, options.raw_preview_chars);
                let preview = serialized[..cut].to_string();
                if truncated {
                    trimmed.items.raw_preview = Some(preview);
                } else {
                    trimmed.items.raw = Some(Value::String(preview));
                }
            }
        }
    }

    if let Some(request) = &scrape.request {
        let snapshot = trim_request_snapshot(request, options.request_max_chars);
        trimmed.request = Some(snapshot.clone());
        // Mirrored into items for downstream consumers.
        trimmed.items.request = Some(snapshot);
    } else if let Some(request) = &scrape.items.request {
        trimmed.items.request = Some(trim_request_snapshot(request, options.request_max_chars));
    }
    if let Some(provider_request) = &scrape.provider_request {
        trimmed.provider_request = Some(shrink_payload(provider_request, options.request_max_chars));
    }
    if let Some(response) = &scrape.response {
        trimmed.response = Some(shrink_payload(response, options.raw_preview_chars.max(1)));
    }
    if let Some(async_response) = &scrape.async_response {
        trimmed.async_response = Some(shrink_payload(
            async_response,
            options.raw_preview_chars.max(1),
        ));
    }

    (trimmed, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload_with_rows(count: usize, description_len: usize) -> ScrapePayload {
        let rows = (0..count)
            .map(|i| NormalizedJob {
                job_title: format!("Engineer {i}"),
                title: format!("Engineer {i}"),
                company: "Acme".into(),
                description: "d".repeat(description_len),
                url: format!("https://acme.com/jobs/{i}"),
                ..NormalizedJob::default()
            })
            .collect();
        ScrapePayload {
            source_url: "https://acme.com/jobs".into(),
            started_at: 1,
            completed_at: 2,
            items: ScrapeItems {
                normalized: rows,
                raw: Some(json!({"events": ["x".repeat(100_000)]})),
                ..ScrapeItems::default()
            },
            ..ScrapePayload::default()
        }
    }

    #[test]
    fn trim_caps_rows_and_descriptions() {
        let payload = payload_with_rows(500, 10_000);
        let (trimmed, truncated) = trim_scrape_payload(&payload, &TrimOptions::default());
        assert!(truncated);
        assert_eq!(trimmed.items.normalized.len(), 400);
        assert!(trimmed.items.normalized[0].description.len() <= 8_000);
        // Raw moved to a preview because rows were dropped.
        assert!(trimmed.items.raw.is_none());
        assert!(trimmed.items.raw_preview.is_some());
    }

    #[test]
    fn aggressive_trim_drops_raw_entirely() {
        let payload = payload_with_rows(10, 10_000);
        let (trimmed, truncated) = trim_scrape_payload(&payload, &TrimOptions::aggressive());
        assert!(!truncated);
        assert!(trimmed.items.raw.is_none());
        assert!(trimmed.items.raw_preview.is_none());
        assert!(trimmed.items.normalized[0].description.len() <= 400);
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret("sk-1234567890"), "sk-1...90");
        assert_eq!(mask_secret("abc"), "***");
        let mut headers = Map::new();
        headers.insert("authorization".into(), json!("Bearer super-secret-token"));
        let sanitized = sanitize_headers(&headers);
        assert_eq!(sanitized["authorization"], "Bear...en");
    }

    #[test]
    fn shrink_payload_previews_large_values() {
        let value = json!({"big": "y".repeat(10_000)});
        let shrunk = shrink_payload(&value, 100);
        let preview = shrunk.as_str().unwrap();
        assert!(preview.len() < 200);
        assert!(preview.contains("chars)"));
        // Small values pass through untouched.
        assert_eq!(shrink_payload(&json!({"a": 1}), 100), json!({"a": 1}));
    }

    #[test]
    fn request_snapshot_is_mirrored_into_items() {
        let mut payload = payload_with_rows(1, 10);
        payload.request = Some(build_request_snapshot(
            json!({"urls": ["https://acme.com"]}),
            "spidercloud",
            "POST",
            "https://api.spider.cloud/v1/crawl",
            Map::new(),
        ));
        let (trimmed, _) = trim_scrape_payload(&payload, &TrimOptions::default());
        assert!(trimmed.items.request.is_some());
        assert_eq!(
            trimmed.items.request.unwrap().url.as_deref(),
            Some("https://api.spider.cloud/v1/crawl")
        );
    }
}
