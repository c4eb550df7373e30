//! Per-site-family handlers: pure transformations from listing payloads
//! to canonical job-detail URLs, pagination URLs, and provider fetch
//! hints. Matching order: explicit site type wins, then the first
//! handler whose host/path predicate matches, with the generic handler
//! as the tail.

mod ashby;
mod avature;
mod cisco;
mod confluent;
mod docusign;
mod generic;
mod github_careers;
mod greenhouse;
mod netflix;
mod notion;
mod openai;
mod uber;
mod workday;

pub use ashby::AshbyHandler;
pub use avature::AvatureHandler;
pub use cisco::CiscoCareersHandler;
pub use confluent::ConfluentHandler;
pub use docusign::DocusignHandler;
pub use generic::GenericHandler;
pub use github_careers::GithubCareersHandler;
pub use greenhouse::GreenhouseHandler;
pub use netflix::NetflixHandler;
pub use notion::NotionCareersHandler;
pub use openai::OpenAiCareersHandler;
pub use uber::UberCareersHandler;
pub use workday::WorkdayHandler;

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use spidercloud_client::ScrapeParams;

use jobsignal_common::SiteType;

use crate::greenhouse::html_unescape;

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).unwrap());
static PRE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<pre[^>]*>(.*?)</pre>").unwrap());

/// Fetch configuration a handler hands the provider adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchHints {
    pub params: ScrapeParams,
    /// Whether pagination links should be pulled from the rendered DOM.
    pub extract_page_links: bool,
}

impl FetchHints {
    pub fn commonmark() -> Self {
        Self {
            params: ScrapeParams::commonmark(),
            extract_page_links: false,
        }
    }

    pub fn raw_html_chrome() -> Self {
        Self {
            params: ScrapeParams::raw_html_chrome(),
            extract_page_links: false,
        }
    }
}

/// Capability set of one site family. Handlers are pure: no I/O, URL and
/// payload transformations only.
pub trait SiteHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn site_type(&self) -> SiteType;

    /// Host/path predicate used by the registry when no site type is
    /// declared.
    fn matches_url(&self, url: &str) -> bool;

    /// True when the URL renders a set of job links rather than a single
    /// posting.
    fn is_listing_url(&self, _url: &str) -> bool {
        false
    }

    /// Canonical listing API endpoint for a marketing listing URL.
    fn listing_api_url(&self, _url: &str) -> Option<String> {
        None
    }

    /// Canonical API detail URL for a marketing detail URL.
    fn api_detail_url(&self, _url: &str) -> Option<String> {
        None
    }

    /// Marketing (apply-preference) URL for an API detail URL.
    fn company_url(&self, _url: &str) -> Option<String> {
        None
    }

    /// Job-detail URLs from a listing API response.
    fn job_urls_from_json(&self, payload: &Value) -> Vec<String> {
        job_urls_from_json_default(payload)
    }

    /// Job-detail (and pagination) URLs from raw listing HTML. The
    /// default only recovers `<pre>`-wrapped JSON payloads.
    fn job_urls_from_html(&self, html: &str) -> Vec<String> {
        extract_pre_json(html)
            .map(|payload| self.job_urls_from_json(&payload))
            .unwrap_or_default()
    }

    /// Job-detail URLs from a commonmark rendering of the listing.
    fn job_urls_from_markdown(&self, _markdown: &str) -> Vec<String> {
        Vec::new()
    }

    /// Further listing pages derived from a listing API response.
    fn pagination_urls_from_json(&self, _payload: &Value, _source_url: Option<&str>) -> Vec<String> {
        Vec::new()
    }

    /// Provider fetch configuration for this URL.
    fn fetch_hints(&self, _url: &str) -> FetchHints {
        FetchHints::commonmark()
    }

    /// Keep only URLs that are plausibly job details for this family.
    fn filter_job_urls(&self, urls: &[String]) -> Vec<String> {
        dedupe(urls.iter().map(|u| u.trim().to_string()))
    }
}

static HANDLERS: LazyLock<Vec<Box<dyn SiteHandler>>> = LazyLock::new(|| {
    vec![
        Box::new(GreenhouseHandler),
        Box::new(AshbyHandler),
        Box::new(GithubCareersHandler),
        Box::new(AvatureHandler),
        Box::new(WorkdayHandler),
        Box::new(NetflixHandler),
        Box::new(UberCareersHandler),
        Box::new(CiscoCareersHandler),
        Box::new(ConfluentHandler),
        Box::new(DocusignHandler),
        Box::new(OpenAiCareersHandler),
        Box::new(NotionCareersHandler),
    ]
});

static GENERIC: GenericHandler = GenericHandler;

/// Handler lookup. An explicit site type wins; otherwise the first URL
/// match; the generic handler serves as the tail whenever a URL exists.
pub fn get_site_handler(url: Option<&str>, site_type: Option<SiteType>) -> Option<&'static dyn SiteHandler> {
    if let Some(site_type) = site_type {
        if site_type != SiteType::Generic {
            if let Some(handler) = HANDLERS.iter().find(|h| h.site_type() == site_type) {
                return Some(handler.as_ref());
            }
        }
    }
    let url = url?;
    if url.is_empty() {
        return None;
    }
    for handler in HANDLERS.iter() {
        if handler.matches_url(url) {
            return Some(handler.as_ref());
        }
    }
    Some(&GENERIC)
}

// --- Shared extraction helpers ---

pub(crate) fn dedupe<I: IntoIterator<Item = String>>(urls: I) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for url in urls {
        if url.is_empty() {
            continue;
        }
        if seen.insert(url.clone()) {
            out.push(url);
        }
    }
    out
}

/// Every anchor href in an HTML document, resolved against `base` when
/// relative.
pub(crate) fn extract_hrefs(html: &str, base: Option<&str>) -> Vec<String> {
    let base_url = base.and_then(|b| url::Url::parse(b).ok());
    let mut out = Vec::new();
    for caps in HREF_RE.captures_iter(html) {
        let href = html_unescape(caps[1].trim());
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }
        if href.starts_with("http://") || href.starts_with("https://") {
            out.push(href);
        } else if let Some(base) = &base_url {
            if let Ok(resolved) = base.join(&href) {
                out.push(resolved.to_string());
            }
        }
    }
    dedupe(out)
}

/// Recover a JSON payload rendered inside a `<pre>` block.
pub(crate) fn extract_pre_json(html: &str) -> Option<Value> {
    for caps in PRE_TAG_RE.captures_iter(html) {
        let content = html_unescape(caps[1].trim());
        if content.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(&content) {
            return Some(value);
        }
    }
    None
}

/// Default JSON traversal: `jobs` rows (directly or under `data`) with
/// the usual URL keys, then `positions` rows with `canonicalPositionUrl`.
pub(crate) fn job_urls_from_json_default(payload: &Value) -> Vec<String> {
    fn url_from_row(row: &Value) -> Option<String> {
        let row = row.as_object()?;
        let data = match row.get("data") {
            Some(Value::Object(data)) => data,
            _ => row,
        };
        for key in [
            "jobUrl",
            "applyUrl",
            "canonicalPositionUrl",
            "canonical_url",
            "absolute_url",
            "postingUrl",
            "url",
        ] {
            if let Some(Value::String(url)) = data.get(key) {
                if !url.trim().is_empty() {
                    return Some(url.trim().to_string());
                }
            }
        }
        None
    }

    let mut urls = Vec::new();
    let candidates = match payload {
        Value::Object(map) => {
            let mut rows: Vec<&Value> = Vec::new();
            for key in ["jobs", "positions"] {
                if let Some(Value::Array(items)) = map.get(key) {
                    rows.extend(items.iter());
                }
            }
            rows
        }
        Value::Array(items) => {
            // A list payload may wrap objects that themselves carry jobs.
            let mut rows: Vec<&Value> = Vec::new();
            for item in items {
                if let Value::Object(map) = item {
                    for key in ["jobs", "positions"] {
                        if let Some(Value::Array(nested)) = map.get(key) {
                            rows.extend(nested.iter());
                        }
                    }
                }
            }
            rows
        }
        _ => Vec::new(),
    };
    for row in candidates {
        if let Some(url) = url_from_row(row) {
            urls.push(url);
        }
    }
    dedupe(urls)
}

/// Query-param helpers shared by pagination builders.
pub(crate) fn set_query_param(url: &str, key: &str, value: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };
    let params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !k.eq_ignore_ascii_case(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed.set_query(None);
    {
        let mut qp = parsed.query_pairs_mut();
        for (k, v) in params {
            qp.append_pair(&k, &v);
        }
        qp.append_pair(key, value);
    }
    parsed.to_string()
}

pub(crate) fn get_query_param(url: &str, key: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.into_owned())
}

pub(crate) fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_default()
}

pub(crate) fn path_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_site_type_wins_over_url() {
        let handler = get_site_handler(Some("https://example.com"), Some(SiteType::Greenhouse))
            .expect("handler");
        assert_eq!(handler.name(), "greenhouse");
    }

    #[test]
    fn url_predicates_route_to_families() {
        let cases = [
            ("https://jobs.ashbyhq.com/lambda", "ashby"),
            ("https://www.github.careers/careers-home/jobs", "github_careers"),
            ("https://bloomberg.avature.net/careers/SearchJobs", "avature"),
            ("https://explore.jobs.netflix.net/careers?query=engineer", "netflix"),
            ("https://careers.cisco.com/global/en/search-results", "cisco"),
            ("https://careers.confluent.io/jobs", "confluent"),
            ("https://careers.docusign.com/api/jobs", "docusign"),
            ("https://openai.com/careers/search/?q=engineer", "openai"),
            ("https://www.notion.com/careers", "notion"),
            ("https://www.uber.com/us/en/careers/list/?query=engineer", "uber"),
        ];
        for (url, expected) in cases {
            let handler = get_site_handler(Some(url), None).expect("handler");
            assert_eq!(handler.name(), expected, "for {url}");
        }
    }

    #[test]
    fn unmatched_urls_fall_back_to_generic() {
        let handler = get_site_handler(Some("https://smallco.example/careers"), None).unwrap();
        assert_eq!(handler.name(), "generic");
        assert!(get_site_handler(None, None).is_none());
    }

    #[test]
    fn default_json_extraction_reads_jobs_and_positions() {
        let payload = json!({
            "positions": [
                {"canonicalPositionUrl": "https://example.com/job/1"},
                {"canonicalPositionUrl": "https://example.com/job/2"},
                {"canonicalPositionUrl": "https://example.com/job/1"}
            ]
        });
        assert_eq!(
            job_urls_from_json_default(&payload),
            vec![
                "https://example.com/job/1".to_string(),
                "https://example.com/job/2".to_string()
            ]
        );

        let jobs = json!({"jobs": [{"jobUrl": "https://x.com/a"}, {"applyUrl": "https://x.com/b"}]});
        assert_eq!(job_urls_from_json_default(&jobs).len(), 2);
    }

    #[test]
    fn pre_json_recovery_handles_escapes_and_lists() {
        let html = r#"<html><pre>{"positions":[{"canonicalPositionUrl":"https://example.com/job/1"}]}</pre></html>"#;
        let payload = extract_pre_json(html).unwrap();
        assert_eq!(
            job_urls_from_json_default(&payload),
            vec!["https://example.com/job/1".to_string()]
        );

        let list_html = r#"<html><pre>[{"jobs":[{"jobUrl":"https://example.com/job/2"}]}]</pre></html>"#;
        let payload = extract_pre_json(list_html).unwrap();
        assert_eq!(
            job_urls_from_json_default(&payload),
            vec!["https://example.com/job/2".to_string()]
        );
    }

    #[test]
    fn hrefs_resolve_relative_urls() {
        let html = r##"<a href="/job/1">one</a> <a href="https://b.com/2">two</a> <a href="#skip">x</a>"##;
        let hrefs = extract_hrefs(html, Some("https://a.com/list"));
        assert_eq!(
            hrefs,
            vec!["https://a.com/job/1".to_string(), "https://b.com/2".to_string()]
        );
    }

    #[test]
    fn query_param_helpers_round_trip() {
        let url = "https://example.com/jobs?page=1&q=rust";
        assert_eq!(get_query_param(url, "page").as_deref(), Some("1"));
        let next = set_query_param(url, "page", "2");
        assert_eq!(get_query_param(&next, "page").as_deref(), Some("2"));
        assert_eq!(get_query_param(&next, "q").as_deref(), Some("rust"));
    }
}
