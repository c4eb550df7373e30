use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output format requested for each scraped page. The JSON variant
/// carries a schema (and optionally a prompt) for structured extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScrapeFormat {
    Named(String),
    Json {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<Value>,
    },
}

impl ScrapeFormat {
    pub fn markdown() -> Self {
        ScrapeFormat::Named("markdown".into())
    }

    pub fn raw_html() -> Self {
        ScrapeFormat::Named("rawHtml".into())
    }

    pub fn json_schema(schema: Value) -> Self {
        ScrapeFormat::Json {
            kind: "json".into(),
            prompt: None,
            schema: Some(schema),
        }
    }

    pub fn json_prompt(prompt: impl Into<String>, schema: Value) -> Self {
        ScrapeFormat::Json {
            kind: "json".into(),
            prompt: Some(prompt.into()),
            schema: Some(schema),
        }
    }
}

/// Webhook subscription sent with a batch start. Metadata values must be
/// strings; the upstream API rejects nulls and non-string values.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl WebhookConfig {
    /// Drop nulls and JSON-stringify anything that is not already a string.
    pub fn stringify_metadata(mut self) -> Self {
        let mut cleaned = Map::new();
        for (key, value) in std::mem::take(&mut self.metadata) {
            let string_value = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Bool(b) => if b { "true" } else { "false" }.to_string(),
                Value::Number(n) => n.to_string(),
                other => serde_json::to_string(&other).unwrap_or_default(),
            };
            cleaned.insert(key, Value::String(string_value));
        }
        self.metadata = cleaned;
        self
    }
}

/// Optional batch knobs forwarded verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BatchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_in_cache: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_main_content: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_invalid_urls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Response to a batch start: the job id used for webhook correlation.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchJob {
    #[serde(alias = "jobId")]
    pub id: String,
    #[serde(default, alias = "statusUrl", alias = "url")]
    pub status_url: Option<String>,
    #[serde(default)]
    pub invalid_urls: Option<Vec<String>>,
}

/// One scraped document inside a batch status payload.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, alias = "rawHtml", skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    pub fn source_url(&self) -> Option<&str> {
        let meta = self.metadata.as_ref()?;
        for key in ["sourceURL", "sourceUrl", "url"] {
            if let Some(url) = meta.get(key).and_then(Value::as_str) {
                if !url.trim().is_empty() {
                    return Some(url);
                }
            }
        }
        None
    }

    pub fn first_text(&self) -> Option<&str> {
        self.raw_html
            .as_deref()
            .or(self.html.as_deref())
            .or(self.markdown.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Batch status, possibly partial while the job is still running.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub data: Vec<Document>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BatchStatus {
    pub fn first_json(&self) -> Option<&Value> {
        self.data.iter().find_map(|doc| doc.json.as_ref())
    }

    pub fn first_text(&self) -> Option<&str> {
        self.data.iter().find_map(|doc| doc.first_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_serialize_to_api_shapes() {
        let named = serde_json::to_value(ScrapeFormat::markdown()).unwrap();
        assert_eq!(named, json!("markdown"));

        let structured = serde_json::to_value(ScrapeFormat::json_schema(json!({"type": "object"})))
            .unwrap();
        assert_eq!(structured["type"], "json");
        assert_eq!(structured["schema"]["type"], "object");
    }

    #[test]
    fn webhook_metadata_is_null_free_and_stringly() {
        let mut metadata = Map::new();
        metadata.insert("siteId".into(), json!("abc"));
        metadata.insert("pattern".into(), Value::Null);
        metadata.insert("retries".into(), json!(3));
        metadata.insert("urls".into(), json!(["https://a", "https://b"]));
        let webhook = WebhookConfig {
            url: "https://example.convex.site/api/firecrawl/webhook".into(),
            events: vec!["completed".into()],
            metadata,
        }
        .stringify_metadata();

        assert!(webhook.metadata.get("pattern").is_none());
        assert_eq!(webhook.metadata["retries"], "3");
        assert_eq!(webhook.metadata["urls"], r#"["https://a","https://b"]"#);
    }

    #[test]
    fn document_source_url_prefers_metadata() {
        let doc: Document = serde_json::from_value(json!({
            "markdown": "# Role",
            "metadata": {"sourceURL": "https://example.com/job/1"}
        }))
        .unwrap();
        assert_eq!(doc.source_url(), Some("https://example.com/job/1"));
    }
}
