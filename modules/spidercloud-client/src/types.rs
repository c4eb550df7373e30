use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request profile for a crawl: `smart` lets the service pick, `chrome`
/// forces a headless browser, `basic` is a plain HTTP fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    Basic,
    #[default]
    Smart,
    Chrome,
}

/// Rendered-DOM wait hint for SPA listing pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaitForSelector {
    pub selector: SelectorSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectorSpec {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl WaitForSelector {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: SelectorSpec {
                selector: selector.into(),
                timeout_ms: None,
            },
        }
    }
}

/// Parameters for a single scrape/crawl request. Serialized as the JSON
/// body alongside the URL.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ScrapeParams {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub return_format: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_redirects: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_host: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<WaitForSelector>,
}

impl ScrapeParams {
    /// Default parameter set for a detail fetch: single page, loose
    /// redirects, markdown output.
    pub fn commonmark() -> Self {
        Self {
            return_format: vec!["commonmark".into()],
            request: Some(RequestMode::Smart),
            metadata: Some(true),
            follow_redirects: Some(true),
            redirect_policy: Some("Loose".into()),
            external_domains: vec!["*".into()],
            preserve_host: Some(true),
            limit: Some(1),
            ..Self::default()
        }
    }

    /// Parameter set for JSON API endpoints rendered through Chrome.
    pub fn raw_html_chrome() -> Self {
        Self {
            return_format: vec!["raw_html".into()],
            request: Some(RequestMode::Chrome),
            metadata: Some(true),
            follow_redirects: Some(true),
            redirect_policy: Some("Loose".into()),
            external_domains: vec!["*".into()],
            preserve_host: Some(false),
            limit: Some(1),
            ..Self::default()
        }
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

/// One event from the JSONL response stream. Known content and cost
/// fields are typed; everything else lands in the extra bag so raw
/// payloads stay inspectable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpiderEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commonmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits_used: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SpiderEvent {
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|_| SpiderEvent {
            extra: match value {
                Value::Object(map) => map,
                other => {
                    let mut map = Map::new();
                    map.insert("value".into(), other);
                    map
                }
            },
            ..SpiderEvent::default()
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_skip_unset_fields() {
        let params = ScrapeParams::commonmark();
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["return_format"][0], "commonmark");
        assert_eq!(value["request"], "smart");
        assert!(value.get("proxy").is_none());
        assert!(value.get("wait_for").is_none());
    }

    #[test]
    fn api_params_disable_host_preservation() {
        let params = ScrapeParams::raw_html_chrome();
        assert_eq!(params.preserve_host, Some(false));
        assert_eq!(params.request, Some(RequestMode::Chrome));
    }

    #[test]
    fn event_keeps_unknown_fields() {
        let event = SpiderEvent::from_value(serde_json::json!({
            "markdown": "# Title",
            "credits_used": 3.5,
            "proxy_pool": "residential",
        }));
        assert_eq!(event.markdown.as_deref(), Some("# Title"));
        assert_eq!(event.credits_used, Some(3.5));
        assert_eq!(event.extra["proxy_pool"], "residential");
    }
}
