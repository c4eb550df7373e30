//! Greenhouse board payloads: lenient loading and job-URL extraction.
//!
//! Boards arrive as clean JSON from the API, as JSON wrapped in a `<pre>`
//! tag when a browser rendered the endpoint, or as JSON embedded somewhere
//! in an HTML page. The loader tries each shape in turn.

use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use jobsignal_common::FilterSettings;

static PRE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<pre[^>]*>(.*?)</pre>").unwrap());
static GREENHOUSE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[\w.-]*greenhouse\.io/[^\s"'>]+"#).unwrap());
static BOARD_SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/boards/([^/]+)/jobs").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GreenhouseJobLocation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreenhouseJob {
    pub absolute_url: String,
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub first_published: Option<String>,
    #[serde(default)]
    pub location: Option<GreenhouseJobLocation>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GreenhouseBoard {
    #[serde(default)]
    pub jobs: Vec<GreenhouseJob>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parse a board payload from raw text or an already-decoded value.
pub fn load_greenhouse_board(raw: &str) -> Result<GreenhouseBoard> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        if let Some(board) = board_from_value(&value) {
            return Ok(board);
        }
    }
    if let Some(payload) = extract_jobs_payload_from_text(raw) {
        if let Some(board) = board_from_value(&payload) {
            return Ok(board);
        }
    }
    bail!("Greenhouse board payload was not valid JSON")
}

fn board_from_value(value: &Value) -> Option<GreenhouseBoard> {
    let payload = find_jobs_payload(value)?;
    serde_json::from_value(payload.clone()).ok()
}

/// Depth-first search for the first object carrying a `jobs` (or
/// `positions`) array.
fn find_jobs_payload(node: &Value) -> Option<&Value> {
    match node {
        Value::Object(map) => {
            if map.get("jobs").map_or(false, Value::is_array) {
                return Some(node);
            }
            if map.get("positions").map_or(false, Value::is_array) {
                return Some(node);
            }
            map.values().find_map(find_jobs_payload)
        }
        Value::Array(items) => items.iter().find_map(find_jobs_payload),
        _ => None,
    }
}

fn extract_jobs_payload_from_text(text: &str) -> Option<Value> {
    let mut candidates: Vec<String> = PRE_TAG_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    candidates.push(text.to_string());

    for candidate in candidates {
        let cleaned = html_unescape(&candidate);
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            continue;
        }
        for parsed in scan_json_candidates(cleaned) {
            if find_jobs_payload(&parsed).is_some() {
                return Some(parsed);
            }
        }
    }
    None
}

/// Scan for embedded JSON objects/arrays and decode each candidate.
fn scan_json_candidates(text: &str) -> Vec<Value> {
    let mut found = Vec::new();
    for (idx, ch) in text.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let mut de = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        if let Some(Ok(mut value)) = de.next() {
            // Double-encoded payloads come back as a JSON string.
            if let Value::String(inner) = &value {
                if let Ok(reparsed) = serde_json::from_str::<Value>(inner) {
                    value = reparsed;
                }
            }
            found.push(value);
            if found.len() >= 8 {
                break;
            }
        }
    }
    found
}

pub fn html_unescape(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Unique job URLs from a board, keyword-filtered when `filters` is given.
pub fn extract_greenhouse_job_urls(
    board: &GreenhouseBoard,
    filters: Option<&FilterSettings>,
) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    for job in &board.jobs {
        if job.absolute_url.is_empty() {
            continue;
        }
        if let Some(filters) = filters {
            if !filters.title_matches_required_keywords(job.title.as_deref()) {
                continue;
            }
        }
        if seen.insert(job.absolute_url.clone()) {
            urls.push(job.absolute_url.clone());
        }
    }
    urls
}

/// API detail URLs for board jobs whose links clearly point at a
/// Greenhouse flow (greenhouse.io hosts or `gh_jid` markers).
pub fn api_detail_urls(
    board: &GreenhouseBoard,
    slug: &str,
    filters: &FilterSettings,
) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    for job in &board.jobs {
        if job.absolute_url.is_empty() {
            continue;
        }
        if !filters.title_matches_required_keywords(job.title.as_deref()) {
            continue;
        }
        if !job.absolute_url.contains("greenhouse.io") && !job.absolute_url.contains("gh_jid") {
            continue;
        }
        let url = format!(
            "https://boards-api.greenhouse.io/v1/boards/{slug}/jobs/{}",
            job.id
        );
        if seen.insert(url.clone()) {
            urls.push(url);
        }
    }
    urls
}

/// Board slug from a listing URL. Prefers `/boards/{slug}/jobs` so
/// api.greenhouse.io links resolve; falls back to the trailing segment.
pub fn board_slug(url: &str) -> Option<String> {
    if let Some(caps) = BOARD_SLUG_RE.captures(url) {
        return Some(caps[1].to_string());
    }
    let parts: Vec<&str> = url.split('/').filter(|p| !p.is_empty()).collect();
    if let Some(idx) = parts.iter().position(|p| *p == "boards") {
        if let Some(slug) = parts.get(idx + 1) {
            return Some(slug.to_string());
        }
    }
    if url.contains("greenhouse") {
        return parts.last().map(|s| s.to_string());
    }
    None
}

/// True for boards-api detail URLs (`/v1/boards/{slug}/jobs/{id}`).
pub fn is_greenhouse_api_url(url: &str) -> bool {
    url.contains("boards-api.greenhouse.io") && url.contains("/jobs/")
}

/// Convert a Greenhouse API detail URL to the public marketing page:
/// `https://boards-api.greenhouse.io/v1/boards/acme/jobs/123` →
/// `https://boards.greenhouse.io/acme/jobs/123`.
pub fn to_marketing_greenhouse_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if !host.contains("greenhouse.io") {
        return None;
    }
    let parts: Vec<&str> = parsed
        .path()
        .split('/')
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() >= 5 && parts[0] == "v1" && parts[1] == "boards" && parts[3] == "jobs" {
        let slug = parts[2];
        let job_id = parts[4];
        return Some(format!("https://boards.greenhouse.io/{slug}/jobs/{job_id}"));
    }
    None
}

/// Fallback extraction for listings when structured parsing fails: every
/// greenhouse.io URL mentioning "jobs", deduped in order.
pub fn regex_extract_job_urls(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    for m in GREENHOUSE_URL_RE.find_iter(text) {
        let url = m.as_str().trim();
        if !url.contains("jobs") {
            continue;
        }
        if seen.insert(url.to_string()) {
            urls.push(url.to_string());
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: &str = r#"{"jobs": [
        {"absolute_url": "https://boards.greenhouse.io/acme/jobs/101", "id": 101, "title": "Software Engineer"},
        {"absolute_url": "https://boards.greenhouse.io/acme/jobs/102", "id": 102, "title": "Staff Engineer"},
        {"absolute_url": "https://boards.greenhouse.io/acme/jobs/103", "id": 103, "title": "Account Manager"},
        {"absolute_url": "https://boards.greenhouse.io/acme/jobs/101", "id": 101, "title": "Software Engineer"}
    ]}"#;

    #[test]
    fn loads_plain_board_json() {
        let board = load_greenhouse_board(BOARD).unwrap();
        assert_eq!(board.jobs.len(), 4);
        assert_eq!(board.jobs[0].id, 101);
    }

    #[test]
    fn loads_pre_wrapped_board_json() {
        let html = format!("<html><body><pre>{}</pre></body></html>", BOARD);
        let board = load_greenhouse_board(&html).unwrap();
        assert_eq!(board.jobs.len(), 4);
    }

    #[test]
    fn loads_escaped_embedded_json() {
        let html = format!(
            "<html><pre>{}</pre></html>",
            BOARD.replace('"', "&quot;")
        );
        let board = load_greenhouse_board(&html).unwrap();
        assert_eq!(board.jobs.len(), 4);
    }

    #[test]
    fn rejects_non_json_payloads() {
        assert!(load_greenhouse_board("<html>just a page</html>").is_err());
    }

    #[test]
    fn url_extraction_dedupes_and_filters_titles() {
        let board = load_greenhouse_board(BOARD).unwrap();
        let filters = FilterSettings::default();
        let urls = extract_greenhouse_job_urls(&board, Some(&filters));
        assert_eq!(
            urls,
            vec![
                "https://boards.greenhouse.io/acme/jobs/101".to_string(),
                "https://boards.greenhouse.io/acme/jobs/102".to_string(),
            ]
        );
        // Without filters the account-manager row survives.
        let unfiltered = extract_greenhouse_job_urls(&board, None);
        assert_eq!(unfiltered.len(), 3);
    }

    #[test]
    fn api_urls_require_greenhouse_links() {
        let raw = r#"{"jobs": [
            {"absolute_url": "https://acme.com/careers/123?gh_jid=123", "id": 123, "title": "Software Engineer"},
            {"absolute_url": "https://acme.com/careers/456", "id": 456, "title": "Platform Engineer"}
        ]}"#;
        let board = load_greenhouse_board(raw).unwrap();
        let urls = api_detail_urls(&board, "acme", &FilterSettings::default());
        assert_eq!(
            urls,
            vec!["https://boards-api.greenhouse.io/v1/boards/acme/jobs/123".to_string()]
        );
    }

    #[test]
    fn board_slug_prefers_boards_path() {
        assert_eq!(
            board_slug("https://api.greenhouse.io/v1/boards/robinhood/jobs").as_deref(),
            Some("robinhood")
        );
        assert_eq!(
            board_slug("https://boards.greenhouse.io/acme").as_deref(),
            Some("acme")
        );
    }

    #[test]
    fn marketing_url_round_trip() {
        let api = "https://boards-api.greenhouse.io/v1/boards/acme/jobs/123";
        assert!(is_greenhouse_api_url(api));
        assert_eq!(
            to_marketing_greenhouse_url(api).as_deref(),
            Some("https://boards.greenhouse.io/acme/jobs/123")
        );
        assert!(to_marketing_greenhouse_url("https://boards.greenhouse.io/acme/jobs/123").is_none());
        assert!(to_marketing_greenhouse_url("https://example.com/v1/boards/a/jobs/1").is_none());
    }

    #[test]
    fn regex_fallback_keeps_job_urls_only() {
        let text = r#"see https://boards.greenhouse.io/acme/jobs/1 and
            https://boards.greenhouse.io/acme/about plus
            https://boards-api.greenhouse.io/v1/boards/acme/jobs/2"#;
        let urls = regex_extract_job_urls(text);
        assert_eq!(urls.len(), 2);
        assert!(urls.iter().all(|u| u.contains("jobs")));
    }
}
