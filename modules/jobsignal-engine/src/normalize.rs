//! Row normalization: provider fragments (JSON rows, markdown, raw HTML)
//! become at most one canonical job row each, or an ignored reason.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use jobsignal_common::{now_ms, FilterSettings, JobLevel};

use crate::greenhouse;
use crate::markdown::{html_to_markdown, parse_markdown_hints, strip_known_nav_blocks};

pub const MAX_DESCRIPTION_CHARS: usize = 8_000;
pub const UNKNOWN_COMPENSATION_REASON: &str = "pending markdown structured extraction";

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}\s*(.+)$").unwrap());
static HEADING_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}\s*").unwrap());
static QUERY_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\?.*$").unwrap());
static SLUG_SEP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-_]+").unwrap());
static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9][0-9,.]+").unwrap());

/// A normalized row as it appears in scrape payload items. Snake-case on
/// the wire; the ingestion step converts these into store job rows.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NormalizedJob {
    pub job_title: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub remote: bool,
    pub level: JobLevel,
    pub description: String,
    pub total_compensation: i64,
    pub compensation_unknown: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_reason: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_url: Option<String>,
    pub posted_at: i64,
}

pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn str_field<'a>(row: &'a Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(value) = row.get(*key) {
            let s = stringify(value);
            if !s.is_empty() {
                return Some(s);
            }
        }
    }
    None
}

/// Company from the URL host: Greenhouse boards carry the slug in the
/// path, other hosts drop `careers./jobs./boards.` prefixes and the TLD.
pub fn derive_company_from_url(url: &str) -> String {
    let parsed = match url::Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return String::new(),
    };
    let mut hostname = parsed.host_str().unwrap_or_default().to_lowercase();

    if hostname.ends_with("greenhouse.io") {
        if let Some(slug) = parsed.path().split('/').find(|p| !p.is_empty()) {
            let cleaned = NON_ALNUM_RE.replace_all(slug, " ").trim().to_string();
            if !cleaned.is_empty() {
                return title_case(&cleaned);
            }
        }
    }

    for prefix in ["careers.", "jobs.", "boards.", "boards-", "job-"] {
        if let Some(stripped) = hostname.strip_prefix(prefix) {
            hostname = stripped.to_string();
            break;
        }
    }

    let parts: Vec<&str> = hostname.split('.').collect();
    let name = if parts.len() >= 2 {
        parts[parts.len() - 2]
    } else if let Some(first) = parts.first() {
        first
    } else {
        return String::new();
    };
    let cleaned = NON_ALNUM_RE.replace_all(name, " ").trim().to_string();
    if cleaned.is_empty() {
        String::new()
    } else {
        title_case(&cleaned)
    }
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn coerce_remote(value: Option<&Value>, location: &str, title: &str) -> bool {
    match value {
        Some(Value::Bool(b)) => return *b,
        Some(Value::String(s)) => {
            let lowered = s.to_lowercase();
            if matches!(lowered.as_str(), "true" | "yes" | "remote" | "hybrid" | "fully remote") {
                return true;
            }
        }
        _ => {}
    }
    location.to_lowercase().contains("remote") || title.to_lowercase().contains("remote")
}

pub fn coerce_level(value: Option<&str>, title: &str) -> JobLevel {
    let normalized = value.map(|v| v.to_lowercase()).unwrap_or_default();
    let markers = if normalized.is_empty() {
        title.to_lowercase()
    } else {
        normalized
    };
    if markers.contains("staff") || markers.contains("principal") {
        return JobLevel::Staff;
    }
    if markers.contains("senior")
        || markers.contains("sr ")
        || markers.contains("sr.")
        || markers.contains("sr-")
        || markers.contains("sr/")
    {
        return JobLevel::Senior;
    }
    if ["lead", "manager", "director", "vp", "chief", "head", "cto"]
        .iter()
        .any(|t| markers.contains(t))
    {
        return JobLevel::Senior;
    }
    if markers.contains("intern") {
        return JobLevel::Intern;
    }
    if markers.contains("jr") || markers.contains("junior") {
        return JobLevel::Junior;
    }
    JobLevel::Mid
}

/// Parse a raw compensation value. Returns (amount, unknown-flag) — the
/// flag is set when nothing usable was found.
pub fn parse_compensation(value: Option<&Value>) -> (i64, bool) {
    match value {
        Some(Value::Number(n)) => {
            let amount = n.as_f64().unwrap_or(0.0);
            if amount > 0.0 {
                return (amount as i64, false);
            }
        }
        Some(Value::String(s)) => {
            let cleaned = s.replace('\u{a0}', " ");
            let best = NUMBER_RE
                .find_iter(&cleaned)
                .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
                .fold(f64::NAN, f64::max);
            if best.is_finite() && best > 0.0 {
                return (best as i64, false);
            }
        }
        _ => {}
    }
    (0, true)
}

/// Posted-at to epoch ms: numbers already in ms pass through, second
/// resolution is scaled, ISO strings are parsed, anything else is now.
pub fn parse_posted_at(value: Option<&Value>) -> i64 {
    let now = now_ms();
    match value {
        Some(Value::Number(n)) => {
            let v = n.as_f64().unwrap_or(0.0);
            if v > 1e12 {
                return v as i64;
            }
            if v > 1e9 {
                return (v * 1000.0) as i64;
            }
            now
        }
        Some(Value::String(s)) => {
            let candidate = s.replace('Z', "+00:00");
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&candidate) {
                return dt.timestamp_millis();
            }
            if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                    return dt.and_utc().timestamp_millis();
                }
            }
            now
        }
        _ => now,
    }
}

pub fn extract_description(row: &Map<String, Value>) -> String {
    for key in ["description", "job_description", "desc", "body", "summary"] {
        if let Some(Value::String(s)) = row.get(key) {
            if !s.trim().is_empty() {
                return s.trim().to_string();
            }
        }
    }
    serde_json::to_string(row).unwrap_or_default()
}

/// Titles/bodies that are an error page rather than a posting.
pub fn looks_like_error_landing(title: Option<&str>, body: &str) -> bool {
    const MARKERS: &[&str] = &[
        "404",
        "page not found",
        "page you were looking for",
        "can't find",
        "cannot be found",
        "doesn't exist",
        "no longer available",
        "position has been filled",
    ];
    if let Some(title) = title {
        let lowered = title.to_lowercase();
        if MARKERS.iter().any(|m| lowered.contains(m)) {
            return true;
        }
    }
    let head: String = body.chars().take(600).collect::<String>().to_lowercase();
    MARKERS.iter().any(|m| head.contains(m))
}

/// Listing-page chrome that slipped through as a job candidate.
pub fn looks_like_listing_page(title: Option<&str>, body: &str) -> bool {
    const MARKERS: &[&str] = &["open positions", "search for opportunities"];
    if let Some(title) = title {
        let lowered = title.to_lowercase();
        if MARKERS.iter().any(|m| lowered.contains(m)) {
            return true;
        }
    }
    let head: String = body.chars().take(600).collect::<String>().to_lowercase();
    MARKERS.iter().any(|m| head.contains(m))
}

/// A markdown body that is actually a whole listing payload (a JSON blob
/// with a jobs/positions array).
pub fn looks_like_listing_payload(markdown: &str) -> bool {
    let trimmed = markdown.trim_start();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return false;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value_has_jobs_array(&value),
        Err(_) => false,
    }
}

fn value_has_jobs_array(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.get("jobs").map_or(false, Value::is_array)
                || map.get("positions").map_or(false, Value::is_array)
                || map.values().any(value_has_jobs_array)
        }
        Value::Array(items) => items.iter().any(value_has_jobs_array),
        _ => false,
    }
}

/// Parse markdown that wraps a Greenhouse job JSON body (title +
/// HTML content). Returns (plain text, title) when it decodes.
pub fn extract_greenhouse_json_markdown(markdown: &str) -> (String, Option<String>) {
    if markdown.is_empty() {
        return (String::new(), None);
    }
    let mut content = markdown.trim().to_string();
    if content.starts_with("```") && content.ends_with("```") {
        content = content
            .trim_matches(|c: char| c == '`' || c == '\n' || c == ' ')
            .to_string();
    }
    let parsed: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(_) => return (markdown.to_string(), None),
    };
    let title = parsed
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string);
    let desc = parsed
        .get("content")
        .and_then(Value::as_str)
        .map(|c| html_to_markdown(&greenhouse::html_unescape(c)))
        .unwrap_or_default();
    match (&title, desc.is_empty()) {
        (Some(t), false) => (format!("{t}\n\n{desc}").trim().to_string(), title.clone()),
        (Some(t), true) => (t.clone(), title.clone()),
        _ => (markdown.to_string(), None),
    }
}

pub fn title_from_markdown(markdown: &str) -> Option<String> {
    for line in markdown.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = HEADING_RE.captures(line) {
            return Some(caps[1].trim().to_string());
        }
        if line.len() > 6 {
            return Some(line.to_string());
        }
    }
    None
}

/// First markdown line that satisfies the required title keywords.
pub fn title_with_required_keyword(markdown: &str, filters: &FilterSettings) -> Option<String> {
    for raw_line in markdown.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let line = HEADING_PREFIX_RE.replace(line, "");
        if filters.title_matches_required_keywords(Some(&line)) {
            return Some(line.trim().to_string());
        }
    }
    None
}

pub fn title_from_url(url: &str) -> String {
    let slug = url.rsplit('/').next().unwrap_or(url);
    let slug = if slug.is_empty() { url } else { slug };
    let cleaned = SLUG_SEP_RE.replace_all(slug, " ");
    let cleaned = QUERY_SUFFIX_RE.replace(&cleaned, "").trim().to_string();
    if cleaned.is_empty() {
        "Untitled".to_string()
    } else {
        title_case(&cleaned)
    }
}

pub fn is_placeholder_title(title: &str) -> bool {
    matches!(
        title.trim().to_lowercase().as_str(),
        "page_title" | "title" | "job_title" | "untitled" | "unknown"
    )
}

/// Normalize one provider row. `None` means the row was dropped (missing
/// URL or failed the keyword filter).
pub fn normalize_single_row(row: &Value, filters: &FilterSettings) -> Option<NormalizedJob> {
    let row = row.as_object()?;

    let raw_title = str_field(row, &["job_title", "title"]);
    let url = str_field(row, &["url", "link", "href", "_url"])?;
    if !filters.title_matches_required_keywords(raw_title.as_deref()) {
        return None;
    }
    let mut title = raw_title.unwrap_or_else(|| "Untitled".to_string());

    let company = str_field(row, &["company", "employer", "organization"])
        .or_else(|| {
            let derived = derive_company_from_url(&url);
            (!derived.is_empty()).then_some(derived)
        })
        .unwrap_or_else(|| "Unknown".to_string());

    let mut location = str_field(row, &["location", "city", "region"]).unwrap_or_default();
    let mut remote = coerce_remote(row.get("remote"), &location, &title);
    if location.is_empty() {
        location = if remote { "Remote" } else { "Unknown" }.to_string();
    }

    let level_value = row.get("level").map(stringify);
    let mut level = coerce_level(level_value.as_deref().filter(|v| !v.is_empty()), &title);

    let mut description = strip_known_nav_blocks(&extract_description(row));
    description.truncate(floor_char_boundary(&description, MAX_DESCRIPTION_CHARS));

    let hints = parse_markdown_hints(&description);
    if let Some(hinted) = &hints.title {
        if title.to_lowercase().starts_with("job application for") {
            title = hinted.clone();
        }
    }
    if location == "Unknown" {
        if let Some(hinted) = &hints.location {
            location = hinted.clone();
        }
    }
    if let Some(hinted) = &hints.level {
        level = coerce_level(Some(hinted), &title);
    }
    match hints.remote {
        Some(true) => remote = true,
        Some(false) => remote = false,
        None => {}
    }

    let (mut total_comp, mut unknown_comp) = parse_compensation(
        row.get("total_compensation")
            .or_else(|| row.get("salary"))
            .or_else(|| row.get("compensation")),
    );
    let mut reason = str_field(row, &["compensation_reason", "compensationReason"]);
    if total_comp <= 0 {
        if let Some(hinted) = hints.compensation {
            total_comp = hinted;
            unknown_comp = false;
            reason = Some("parsed from description".to_string());
        }
    }

    let posted_at = parse_posted_at(
        row.get("posted_at")
            .or_else(|| row.get("postedAt"))
            .or_else(|| row.get("date"))
            .or_else(|| row.get("_timestamp")),
    );

    Some(NormalizedJob {
        job_title: title.clone(),
        title,
        company,
        location,
        remote,
        level,
        description,
        total_compensation: total_comp,
        compensation_unknown: unknown_comp,
        compensation_reason: reason,
        url,
        apply_url: None,
        posted_at,
    })
}

/// Truncation helper that never splits a UTF-8 character.
pub fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Collect candidate rows from a batch-async result payload. Rows may be
/// nested under `json.items`, `items`, or `data` blocks.
pub fn rows_from_firecrawl_payload(payload: &Value) -> Vec<Value> {
    let mut rows = Vec::new();
    collect_firecrawl_rows(payload, &mut rows);
    rows
}

fn collect_firecrawl_rows(payload: &Value, rows: &mut Vec<Value>) {
    match payload {
        Value::Array(items) => {
            rows.extend(items.iter().filter(|i| i.is_object()).cloned());
        }
        Value::Object(map) => {
            if let Some(json_val) = map.get("json") {
                match json_val {
                    Value::Object(json_map) => {
                        if let Some(Value::Array(items)) = json_map.get("items") {
                            rows.extend(items.iter().filter(|i| i.is_object()).cloned());
                        } else {
                            rows.push(json_val.clone());
                        }
                    }
                    Value::Array(items) => {
                        rows.extend(items.iter().filter(|i| i.is_object()).cloned());
                    }
                    _ => {}
                }
            }
            if let Some(Value::Array(items)) = map.get("items") {
                rows.extend(items.iter().filter(|i| i.is_object()).cloned());
            } else {
                rows.push(payload.clone());
            }
            match map.get("data") {
                Some(Value::Array(entries)) => {
                    for entry in entries {
                        collect_firecrawl_rows(entry, rows);
                    }
                }
                Some(data @ Value::Object(_)) => collect_firecrawl_rows(data, rows),
                _ => {}
            }
        }
        _ => {}
    }
}

pub fn normalize_firecrawl_items(payload: &Value, filters: &FilterSettings) -> Vec<NormalizedJob> {
    rows_from_firecrawl_payload(payload)
        .iter()
        .filter_map(|row| normalize_single_row(row, filters))
        .collect()
}

/// Collect candidate rows from a template-crawl result payload.
pub fn rows_from_fetchfox_payload(payload: &Value) -> Vec<Value> {
    let mut rows: Vec<Value> = Vec::new();
    let mut push_array = |value: Option<&Value>, rows: &mut Vec<Value>| {
        if let Some(Value::Array(items)) = value {
            rows.extend(items.iter().filter(|i| i.is_object()).cloned());
        }
    };
    match payload {
        Value::Array(items) => {
            rows.extend(items.iter().filter(|i| i.is_object()).cloned());
        }
        Value::Object(map) => {
            push_array(map.get("normalized"), &mut rows);
            push_array(map.get("items"), &mut rows);
            push_array(map.get("results"), &mut rows);
            if let Some(Value::Object(results)) = map.get("results") {
                push_array(results.get("items"), &mut rows);
                push_array(results.get("normalized"), &mut rows);
            }
            if let Some(data @ Value::Object(_)) = map.get("data") {
                rows.extend(rows_from_fetchfox_payload(data));
            }
        }
        _ => {}
    }
    rows
}

pub fn normalize_fetchfox_items(payload: &Value, filters: &FilterSettings) -> Vec<NormalizedJob> {
    rows_from_fetchfox_payload(payload)
        .iter()
        .filter_map(|row| normalize_single_row(row, filters))
        .collect()
}

/// Pull a raw text body out of a template-crawl result for board parsing.
pub fn extract_raw_body_from_fetchfox_result(result: &Value) -> String {
    fn body_from_map(map: &Map<String, Value>) -> Option<String> {
        for key in ["raw_html", "html", "content", "body", "text", "raw"] {
            if let Some(Value::String(s)) = map.get(key) {
                if !s.trim().is_empty() {
                    return Some(s.clone());
                }
            }
        }
        None
    }

    match result {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(body) = body_from_map(map) {
                return body;
            }
            if let Some(Value::Object(results)) = map.get("results") {
                if let Some(body) = body_from_map(results) {
                    return body;
                }
            }
            if let Some(Value::Array(items)) = map.get("items") {
                if let Some(Value::Object(first)) = items.first() {
                    if let Some(body) = body_from_map(first) {
                        return body;
                    }
                }
            }
            serde_json::to_string(result).unwrap_or_default()
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters() -> FilterSettings {
        FilterSettings::default()
    }

    #[test]
    fn normalizes_a_plain_row() {
        let row = json!({
            "title": "Senior Software Engineer",
            "company": "Acme",
            "url": "https://acme.com/jobs/1",
            "location": "Denver, CO",
            "salary": "$150,000 - $170,000",
        });
        let job = normalize_single_row(&row, &filters()).unwrap();
        assert_eq!(job.title, "Senior Software Engineer");
        assert_eq!(job.level, JobLevel::Senior);
        assert_eq!(job.total_compensation, 170_000);
        assert!(!job.compensation_unknown);
        assert_eq!(job.location, "Denver, CO");
    }

    #[test]
    fn drops_rows_without_urls_or_keywords() {
        assert!(normalize_single_row(&json!({"title": "Software Engineer"}), &filters()).is_none());
        assert!(normalize_single_row(
            &json!({"title": "Sales Associate", "url": "https://x.com/1"}),
            &filters()
        )
        .is_none());
    }

    #[test]
    fn unknown_title_is_allowed_and_defaults() {
        let row = json!({ "url": "https://careers.acme.com/jobs/1" });
        let job = normalize_single_row(&row, &filters()).unwrap();
        assert_eq!(job.title, "Untitled");
        assert_eq!(job.company, "Acme");
    }

    #[test]
    fn company_derivation_understands_hosts() {
        assert_eq!(
            derive_company_from_url("https://boards.greenhouse.io/coreweave/jobs/1"),
            "Coreweave"
        );
        assert_eq!(derive_company_from_url("https://careers.docusign.com/jobs/1"), "Docusign");
        assert_eq!(derive_company_from_url("https://jobs.example.co.uk/1"), "Co");
        assert_eq!(derive_company_from_url("not a url"), "");
    }

    #[test]
    fn hints_fill_missing_fields() {
        let row = json!({
            "title": "Job application for Software Engineer",
            "url": "https://acme.com/jobs/2",
            "description": "# Staff Software Engineer\n\nAustin, TX\n\n$180,000 - $220,000 per year",
        });
        let job = normalize_single_row(&row, &filters()).unwrap();
        assert_eq!(job.title, "Staff Software Engineer");
        assert_eq!(job.level, JobLevel::Staff);
        assert_eq!(job.location, "Austin, TX");
        assert_eq!(job.total_compensation, 200_000);
        assert_eq!(job.compensation_reason.as_deref(), Some("parsed from description"));
    }

    #[test]
    fn level_coercion_handles_markers() {
        assert_eq!(coerce_level(None, "Principal Engineer"), JobLevel::Staff);
        assert_eq!(coerce_level(None, "Engineering Manager"), JobLevel::Senior);
        assert_eq!(coerce_level(None, "Software Engineer Intern"), JobLevel::Intern);
        assert_eq!(coerce_level(None, "Jr Developer"), JobLevel::Junior);
        assert_eq!(coerce_level(None, "Software Engineer"), JobLevel::Mid);
        assert_eq!(coerce_level(Some("staff"), "whatever"), JobLevel::Staff);
    }

    #[test]
    fn posted_at_handles_units_and_strings() {
        assert_eq!(
            parse_posted_at(Some(&json!(1_700_000_000_000i64))),
            1_700_000_000_000
        );
        assert_eq!(
            parse_posted_at(Some(&json!(1_700_000_000))),
            1_700_000_000_000
        );
        let iso = parse_posted_at(Some(&json!("2024-03-01T00:00:00Z")));
        assert_eq!(iso, 1_709_251_200_000);
        // Small numbers and garbage fall back to now.
        let now = now_ms();
        assert!(parse_posted_at(Some(&json!(42))) >= now - 1000);
    }

    #[test]
    fn error_landing_and_listing_detection() {
        assert!(looks_like_error_landing(Some("404 - Page not found"), ""));
        assert!(looks_like_error_landing(None, "The page you were looking for is gone"));
        assert!(!looks_like_error_landing(Some("Software Engineer"), "Great job"));

        assert!(looks_like_listing_page(
            Some("Open Positions"),
            "Open Positions / Select Country / United States"
        ));
        assert!(!looks_like_listing_page(Some("Software Engineer"), "body"));
    }

    #[test]
    fn listing_payload_detection() {
        let payload = r#"{"jobs": [{"jobUrl": "https://x.com/1"}]}"#;
        assert!(looks_like_listing_payload(payload));
        assert!(!looks_like_listing_payload("# Software Engineer"));
    }

    #[test]
    fn greenhouse_json_markdown_extraction() {
        let markdown = r#"{"title": "Software Engineer", "content": "&lt;p&gt;Build things&lt;/p&gt;"}"#;
        let (text, title) = extract_greenhouse_json_markdown(markdown);
        assert_eq!(title.as_deref(), Some("Software Engineer"));
        assert!(text.contains("Build things"));

        let (passthrough, none) = extract_greenhouse_json_markdown("# Plain markdown");
        assert_eq!(passthrough, "# Plain markdown");
        assert!(none.is_none());
    }

    #[test]
    fn firecrawl_rows_are_collected_from_nested_shapes() {
        let payload = json!({
            "data": [
                {"json": {"items": [
                    {"title": "Software Engineer", "url": "https://a.com/1"},
                    {"title": "Sales Rep", "url": "https://a.com/2"}
                ]}},
                {"json": {"title": "Platform Engineer", "url": "https://a.com/3"}}
            ]
        });
        let jobs = normalize_firecrawl_items(&payload, &filters());
        let urls: Vec<&str> = jobs.iter().map(|j| j.url.as_str()).collect();
        assert!(urls.contains(&"https://a.com/1"));
        assert!(urls.contains(&"https://a.com/3"));
        assert!(!urls.contains(&"https://a.com/2"));
    }

    #[test]
    fn fetchfox_raw_body_extraction() {
        let result = json!({"results": {"raw_html": "<html>board</html>"}});
        assert_eq!(extract_raw_body_from_fetchfox_result(&result), "<html>board</html>");
        let nested = json!({"items": [{"content": "text body"}]});
        assert_eq!(extract_raw_body_from_fetchfox_result(&nested), "text body");
    }

    #[test]
    fn title_fallbacks() {
        assert_eq!(
            title_from_url("https://acme.com/jobs/senior-platform-engineer"),
            "Senior Platform Engineer"
        );
        assert!(is_placeholder_title("Page_Title"));
        assert!(!is_placeholder_title("Software Engineer"));
        assert_eq!(
            title_from_markdown("\n## Backend Engineer\nbody").as_deref(),
            Some("Backend Engineer")
        );
        let filters = filters();
        assert_eq!(
            title_with_required_keyword("intro\n# Senior Software Engineer\n", &filters).as_deref(),
            Some("Senior Software Engineer")
        );
    }
}
