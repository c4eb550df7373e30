//! Heuristic enrichment: reparse job descriptions for missing location
//! and compensation with learned per-domain regexes. The patch builder is
//! pure — it returns the patch and the learned-regex records, and the
//! batch processor is the only writer.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use jobsignal_common::{
    now_ms, FilterSettings, HeuristicConfig, HeuristicField, JobInput, PendingJobDetail,
    RemoteCompanies,
};
use jobsignal_store::Store;

use crate::markdown::{normalize_locations, parse_markdown_hints, strip_known_nav_blocks};

/// Bumped whenever the enrichment logic changes so older rows re-enrich.
pub const HEURISTIC_VERSION: u32 = 4;

pub const LOCATION_FULL_PATTERN: &str = r"(?P<location>[A-Z][A-Za-z .'-]+,\s*[A-Z][A-Za-z .'-]{3,})";
pub const LOCATION_LABEL_PATTERN: &str =
    r"location[:\-\s]+(?P<location>[A-Z][A-Za-z .'-]+,\s*[A-Z]{2})";
pub const LOCATION_CITY_STATE_PATTERN: &str = r"(?P<location>[A-Z][A-Za-z .'-]+,\s*[A-Z]{2})";
pub const LOCATION_PAREN_PATTERN: &str = r"\((?P<location>[A-Z][A-Za-z .'-]+,\s*[A-Z]{2})\)";

pub const COMP_USD_RANGE_PATTERN: &str =
    r"\$\s*(?P<low>\d{2,3}(?:[.,]\d{3})?)(?:\s*[-–]\s*\$?\s*(?P<high>\d{2,3}(?:[.,]\d{3})?))?";
pub const COMP_INR_RANGE_PATTERN: &str =
    r"₹\s*(?P<low>\d{1,3}(?:[.,]\d{3})?)(?:\s*[-–]\s*₹?\s*(?P<high>\d{1,3}(?:[.,]\d{3})?))?";
pub const COMP_K_PATTERN: &str = r"(?P<value>\d{2,3})k";
pub const COMP_LPA_PATTERN: &str = r"(?P<value>\d{1,3})\s*(lpa|lakh)";

static LOCATION_ANYWHERE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z].*,\s*[A-Za-z]").unwrap());
static COUNTRY_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{2}$").unwrap());
static REQUEST_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Request ID:\s*([^\]]+)\]").unwrap());

const CANADIAN_PROVINCE_CODES: &[&str] = &[
    "AB", "BC", "MB", "NB", "NL", "NS", "NT", "NU", "ON", "PE", "QC", "SK", "YT",
];
const CANADIAN_PROVINCE_NAMES: &[&str] = &[
    "alberta",
    "british columbia",
    "manitoba",
    "new brunswick",
    "newfoundland and labrador",
    "nova scotia",
    "northwest territories",
    "nunavut",
    "ontario",
    "prince edward island",
    "quebec",
    "saskatchewan",
    "yukon",
];
const UNKNOWN_LOCATION_TOKENS: &[&str] = &["unknown", "n/a", "na", "unspecified", "not available"];

const US_STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ", "NM",
    "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA",
    "WV", "WI", "WY", "PR", "GU", "VI",
];
const US_STATE_NAMES: &[&str] = &[
    "alabama",
    "alaska",
    "arizona",
    "arkansas",
    "california",
    "colorado",
    "connecticut",
    "delaware",
    "district of columbia",
    "florida",
    "georgia",
    "hawaii",
    "idaho",
    "illinois",
    "indiana",
    "iowa",
    "kansas",
    "kentucky",
    "louisiana",
    "maine",
    "maryland",
    "massachusetts",
    "michigan",
    "minnesota",
    "mississippi",
    "missouri",
    "montana",
    "nebraska",
    "nevada",
    "new hampshire",
    "new jersey",
    "new mexico",
    "new york",
    "north carolina",
    "north dakota",
    "ohio",
    "oklahoma",
    "oregon",
    "pennsylvania",
    "rhode island",
    "south carolina",
    "south dakota",
    "tennessee",
    "texas",
    "utah",
    "vermont",
    "virginia",
    "washington",
    "west virginia",
    "wisconsin",
    "wyoming",
    "puerto rico",
    "guam",
    "virgin islands",
];

/// Currency hinted by the description text. A bare dollar sign only
/// counts when no AUD/CAD marker is nearby.
pub fn detect_currency_code(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    let checks: [(&str, &[&str]); 5] = [
        ("INR", &["₹", "rupee", "inr", "lakh", "lpa"]),
        ("GBP", &["£", "gbp"]),
        ("EUR", &["€", "eur"]),
        ("AUD", &["aud", "a$"]),
        ("CAD", &["cad", "c$"]),
    ];
    for (code, needles) in checks {
        if needles.iter().any(|n| lowered.contains(n)) {
            return Some(code);
        }
    }
    if text.contains('$') && !lowered.contains("aud") && !lowered.contains("cad") {
        return Some("USD");
    }
    None
}

/// Allow non-US locations such as "Bangalore, India" through heuristic
/// parsing.
pub fn looks_like_location_anywhere(value: &str) -> bool {
    let text = value.trim();
    if text.len() < 3 || text.len() > 80 {
        return false;
    }
    LOCATION_ANYWHERE_RE.is_match(text)
}

pub fn domain_from_url(url: &str) -> String {
    url.split("://")
        .last()
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

pub fn derive_location_states(locations: &[String]) -> Vec<String> {
    let mut states = Vec::new();
    for loc in locations {
        let parts: Vec<&str> = loc.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
        if parts.len() >= 2 {
            let state = if parts.len() >= 3 {
                parts[parts.len() - 2]
            } else {
                parts[parts.len() - 1]
            };
            if !state.is_empty() && !states.contains(&state.to_string()) {
                states.push(state.to_string());
            }
        }
    }
    states
}

pub fn derive_countries(locations: &[String]) -> Vec<String> {
    let mut countries = Vec::new();
    for loc in locations {
        let parts: Vec<&str> = loc.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
        let Some(country) = parts.last() else {
            continue;
        };
        let lowered = country.to_lowercase();
        let upper = country.to_uppercase();
        let mapped: Option<String> = if lowered.contains("remote") {
            Some("United States".into())
        } else if lowered == "locations" {
            None
        } else if UNKNOWN_LOCATION_TOKENS.contains(&lowered.as_str()) {
            Some("United States".into())
        } else if US_STATE_CODES.contains(&upper.as_str()) {
            Some("United States".into())
        } else if COUNTRY_CODE_RE.is_match(country) {
            if CANADIAN_PROVINCE_CODES.contains(&upper.as_str()) {
                Some("Canada".into())
            } else {
                None
            }
        } else if CANADIAN_PROVINCE_NAMES.contains(&lowered.as_str()) {
            Some("Canada".into())
        } else if US_STATE_NAMES.contains(&lowered.as_str()) {
            Some("United States".into())
        } else {
            Some(country.to_string())
        };
        if let Some(mapped) = mapped {
            if !countries.contains(&mapped) {
                countries.push(mapped);
            }
        }
    }
    countries
}

pub fn build_location_search(locations: &[String]) -> String {
    let mut tokens: Vec<String> = locations
        .iter()
        .flat_map(|loc| loc.split([',', ' ']))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    tokens.sort();
    tokens.join(" ")
}

/// Request id pulled out of a store error message for the per-row error
/// log.
pub fn extract_request_id(message: &str) -> Option<String> {
    REQUEST_ID_RE
        .captures(message)
        .map(|caps| caps[1].trim().to_string())
}

/// Learned configs for this field first (in recorded order), defaults
/// after, deduped.
pub fn build_ordered_regexes(
    configs: &[HeuristicConfig],
    field: HeuristicField,
    defaults: &[&str],
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for config in configs {
        if config.field != field || config.regex.trim().is_empty() {
            continue;
        }
        if seen.insert(config.regex.clone()) {
            ordered.push(config.regex.clone());
        }
    }
    for default in defaults {
        if seen.insert(default.to_string()) {
            ordered.push(default.to_string());
        }
    }
    ordered
}

/// First regex that matches, with its captured value: named groups
/// `location`/`value` preferred, whole match otherwise. Invalid learned
/// patterns are skipped.
pub fn first_match(text: &str, regexes: &[String]) -> (Option<String>, Option<String>) {
    for pattern in regexes {
        let compiled = match Regex::new(&format!("(?im){pattern}")) {
            Ok(re) => re,
            Err(_) => continue,
        };
        if let Some(caps) = compiled.captures(text) {
            let value = caps
                .name("location")
                .or_else(|| caps.name("value"))
                .map(|m| m.as_str().to_string())
                .or_else(|| caps.get(0).map(|m| m.as_str().to_string()));
            return (Some(pattern.clone()), value);
        }
    }
    (None, None)
}

/// The fields the patch builder reads, independent of whether the row
/// came from the pending-details query or the ingestion path.
#[derive(Debug, Clone, Default)]
pub struct HeuristicRow {
    pub url: String,
    pub company: String,
    pub description: String,
    pub location: Option<String>,
    pub remote: Option<bool>,
    pub total_compensation: Option<i64>,
    pub compensation_unknown: Option<bool>,
    pub compensation_reason: Option<String>,
    pub currency_code: Option<String>,
    pub heuristic_attempts: u32,
}

impl From<&JobInput> for HeuristicRow {
    fn from(job: &JobInput) -> Self {
        Self {
            url: job.url.clone(),
            company: job.company.clone(),
            description: job.description.clone(),
            location: Some(job.location.clone()).filter(|l| !l.is_empty()),
            remote: Some(job.remote),
            total_compensation: Some(job.total_compensation),
            compensation_unknown: job.compensation_unknown,
            compensation_reason: job.compensation_reason.clone(),
            currency_code: job.currency_code.clone(),
            heuristic_attempts: 0,
        }
    }
}

impl From<&PendingJobDetail> for HeuristicRow {
    fn from(row: &PendingJobDetail) -> Self {
        Self {
            url: row.url.clone(),
            company: row.company.clone().unwrap_or_default(),
            description: row.description.clone().unwrap_or_default(),
            location: row.location.clone().filter(|l| !l.is_empty()),
            remote: row.remote,
            total_compensation: row.total_compensation,
            compensation_unknown: row.compensation_unknown,
            compensation_reason: row.compensation_reason.clone(),
            currency_code: row.currency_code.clone(),
            heuristic_attempts: row.heuristic_attempts.unwrap_or(0),
        }
    }
}

/// Patch produced by one enrichment pass. Serialized camelCase for
/// `router:updateJobWithHeuristic`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeuristicPatch {
    pub heuristic_attempts: u32,
    pub heuristic_last_tried: i64,
    pub heuristic_version: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub location_states: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_search: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub countries: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_compensation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensation_unknown: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl HeuristicPatch {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Merge the patch into a job row before ingestion.
    pub fn apply_to(&self, job: &mut JobInput) {
        if let Some(location) = &self.location {
            job.location = location.clone();
        }
        if !self.locations.is_empty() {
            job.locations = self.locations.clone();
        }
        if let Some(country) = &self.country {
            job.country = Some(country.clone());
        }
        if let Some(total) = self.total_compensation {
            job.total_compensation = total;
        }
        if let Some(reason) = &self.compensation_reason {
            job.compensation_reason = Some(reason.clone());
        }
        if let Some(unknown) = self.compensation_unknown {
            job.compensation_unknown = Some(unknown);
        }
        if let Some(code) = &self.currency_code {
            job.currency_code = Some(code.clone());
        }
        if let Some(remote) = self.remote {
            job.remote = remote;
        }
        if let Some(description) = &self.description {
            job.description = description.clone();
        }
    }
}

/// Build the enrichment patch for one row. Pure: learned-regex records
/// are returned for the caller to persist.
pub fn build_heuristic_patch(
    row: &HeuristicRow,
    configs: &[HeuristicConfig],
    filters: &FilterSettings,
    remote_companies: &RemoteCompanies,
    now_ms: i64,
) -> (HeuristicPatch, Vec<HeuristicConfig>) {
    let description = strip_known_nav_blocks(&row.description);
    let domain = {
        let d = domain_from_url(&row.url);
        if d.is_empty() {
            "default".to_string()
        } else {
            d
        }
    };
    let mut records: Vec<HeuristicConfig> = Vec::new();
    let mut recorded_location = false;
    let mut recorded_comp = false;

    let location_regexes = build_ordered_regexes(
        configs,
        HeuristicField::Location,
        &[
            LOCATION_FULL_PATTERN,
            LOCATION_LABEL_PATTERN,
            LOCATION_CITY_STATE_PATTERN,
            LOCATION_PAREN_PATTERN,
        ],
    );
    let comp_regexes = build_ordered_regexes(
        configs,
        HeuristicField::Compensation,
        &[
            COMP_USD_RANGE_PATTERN,
            COMP_INR_RANGE_PATTERN,
            COMP_K_PATTERN,
            COMP_LPA_PATTERN,
        ],
    );

    let hints = parse_markdown_hints(&description);
    let company_remote = remote_companies.is_remote_company(&row.company);
    let raw_location = row.location.clone().unwrap_or_default();
    let raw_location_lower = raw_location.to_lowercase();
    let location_unknown = raw_location.trim().is_empty()
        || UNKNOWN_LOCATION_TOKENS.contains(&raw_location_lower.as_str());
    let location_fallback = if location_unknown {
        hints.location.clone()
    } else {
        Some(raw_location.clone()).filter(|l| !l.is_empty()).or(hints.location.clone())
    };

    let mut is_remote = company_remote || hints.remote == Some(true) || row.remote == Some(true);
    if hints.remote == Some(false) && !company_remote {
        is_remote = false;
    }
    if raw_location_lower.contains("remote") {
        is_remote = true;
    }

    let mut locations = if !hints.locations.is_empty() {
        normalize_locations(&hints.locations)
    } else if let Some(fallback) = &location_fallback {
        normalize_locations([fallback.as_str()])
    } else {
        Vec::new()
    };

    let mut total_comp = row.total_compensation.unwrap_or(0);
    let mut compensation_unknown = row.compensation_unknown;
    let mut comp_reason = row.compensation_reason.clone();
    let mut currency_code = row.currency_code.clone();
    let currency_hint = detect_currency_code(&description);
    if let Some(hint) = currency_hint {
        if currency_code.as_deref() != Some(hint) {
            currency_code = Some(hint.to_string());
        }
    }

    if total_comp <= 0 {
        if let Some(hinted) = hints.compensation {
            total_comp = hinted;
            compensation_unknown = Some(false);
            comp_reason = Some("parsed from description".into());
        } else if let Some(range) = hints.compensation_range {
            let values: Vec<i64> = [range.low, range.high]
                .into_iter()
                .flatten()
                .filter(|v| *v >= 1000)
                .collect();
            if !values.is_empty() {
                total_comp = values.iter().sum::<i64>() / values.len() as i64;
                compensation_unknown = Some(false);
                comp_reason = Some("parsed from description".into());
            }
        }
    } else if compensation_unknown.is_none() {
        compensation_unknown = Some(false);
    }

    if !description.is_empty() {
        let (pattern, found) = first_match(&description, &location_regexes);
        if let Some(found) = found {
            if filters.location_matches_usa(Some(&found)) || looks_like_location_anywhere(&found) {
                let found_locations = normalize_locations([found.as_str()]);
                if !found_locations.is_empty() {
                    if locations.is_empty() {
                        locations = found_locations;
                    }
                    if let Some(pattern) = pattern {
                        records.push(HeuristicConfig {
                            domain: domain.clone(),
                            field: HeuristicField::Location,
                            regex: pattern,
                        });
                        recorded_location = true;
                    }
                }
            }
        }
    }

    if locations.is_empty() {
        locations = match currency_hint {
            Some("INR") => vec!["India".to_string()],
            Some("GBP") => vec!["United Kingdom".to_string()],
            Some("EUR") => vec!["Europe".to_string()],
            _ => Vec::new(),
        };
    }
    if locations.is_empty() && is_remote {
        locations = vec!["Remote".to_string()];
    }
    // Dedup by city part so "Austin, TX" and "Austin, Texas" collapse.
    let mut seen_cities = HashSet::new();
    locations.retain(|loc| {
        let city = loc
            .split(',')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        seen_cities.insert(city)
    });

    let mut countries = derive_countries(&locations);
    if countries.is_empty() && (is_remote || location_unknown) {
        countries = vec!["United States".to_string()];
    }

    if total_comp <= 0 && !description.is_empty() {
        let (pattern, found) = first_match(&description, &comp_regexes);
        if let Some(found) = found {
            let cleaned = found.replace(',', "").to_lowercase();
            let comp_val: Option<i64> = if cleaned.contains("lpa") || cleaned.contains("lakh") {
                let digits: String = cleaned
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.')
                    .collect();
                digits.parse::<f64>().ok().map(|v| (v * 100_000.0) as i64)
            } else if cleaned.ends_with('k') {
                cleaned
                    .trim_end_matches('k')
                    .trim_start_matches(|c: char| !c.is_ascii_digit())
                    .parse::<f64>()
                    .ok()
                    .map(|v| (v * 1000.0) as i64)
            } else {
                let digits: String = cleaned.chars().filter(|c| c.is_ascii_digit()).collect();
                digits.parse::<i64>().ok()
            };
            if let Some(comp_val) = comp_val.filter(|v| *v > 0) {
                total_comp = comp_val;
                compensation_unknown = Some(false);
                comp_reason = Some("parsed with heuristic".into());
                if let Some(hint) = currency_hint {
                    if hint != "USD" {
                        currency_code = Some(hint.to_string());
                    }
                }
            }
            if let Some(pattern) = pattern {
                records.push(HeuristicConfig {
                    domain: domain.clone(),
                    field: HeuristicField::Compensation,
                    regex: pattern,
                });
                recorded_comp = true;
            }
        }
    }

    // Markdown hints that produced values are recorded too, as markers.
    if !locations.is_empty() && !recorded_location {
        records.push(HeuristicConfig {
            domain: domain.clone(),
            field: HeuristicField::Location,
            regex: "hint:location".into(),
        });
    }
    if total_comp > 0 && !recorded_comp {
        records.push(HeuristicConfig {
            domain,
            field: HeuristicField::Compensation,
            regex: "hint:compensation".into(),
        });
    }

    let mut patch = HeuristicPatch {
        heuristic_attempts: row.heuristic_attempts + 1,
        heuristic_last_tried: now_ms,
        heuristic_version: HEURISTIC_VERSION,
        ..HeuristicPatch::default()
    };
    if !locations.is_empty() {
        patch.location = locations.first().cloned();
        patch.location_states = derive_location_states(&locations);
        patch.location_search = Some(build_location_search(&locations));
        patch.locations = locations;
    }
    if !countries.is_empty() {
        patch.country = countries.first().cloned();
        patch.countries = countries;
    }
    if total_comp > 0 {
        patch.total_compensation = Some(total_comp);
    }
    if let Some(reason) = comp_reason {
        patch.compensation_reason = Some(reason);
    }
    if let Some(unknown) = compensation_unknown {
        patch.compensation_unknown = Some(unknown);
    }
    if let Some(code) = currency_code {
        patch.currency_code = Some(code);
    }
    let mut remote_hint = hints.remote;
    if company_remote {
        remote_hint = Some(true);
    }
    match remote_hint {
        Some(true) if row.remote != Some(true) => patch.remote = Some(true),
        Some(false) if row.remote != Some(false) => patch.remote = Some(false),
        _ => {}
    }
    if !description.is_empty() && description != row.description {
        patch.description = Some(description);
    }

    (patch, records)
}

/// Summary of one enrichment tick.
#[derive(Debug, Default)]
pub struct EnrichmentSummary {
    pub fetched: usize,
    pub processed: usize,
    pub updated: Vec<String>,
    pub remaining: Option<u64>,
    pub errors: Vec<(String, String)>,
}

/// Process up to `limit` pending job-detail rows: build patches, persist
/// learned regexes, apply updates. Per-row failures are logged with the
/// extracted request id and never abort the batch.
pub async fn process_pending_job_details_batch(
    store: &Arc<dyn Store>,
    filters: &FilterSettings,
    remote_companies: &RemoteCompanies,
    limit: usize,
) -> anyhow::Result<EnrichmentSummary> {
    let pending = store.list_pending_job_details(limit).await?;
    let mut summary = EnrichmentSummary {
        fetched: pending.len(),
        ..EnrichmentSummary::default()
    };
    tracing::info!(fetched = summary.fetched, limit, "heuristic batch start");

    for row in &pending {
        let Some(job_id) = row.target_id().map(str::to_string) else {
            continue;
        };
        let domain = domain_from_url(&row.url);
        let configs = store
            .list_job_detail_configs(&domain)
            .await
            .unwrap_or_default();
        let (patch, records) = build_heuristic_patch(
            &HeuristicRow::from(row),
            &configs,
            filters,
            remote_companies,
            now_ms(),
        );

        for record in records {
            if let Err(err) = store.record_job_detail_heuristic(record).await {
                let message = err.to_string();
                tracing::warn!(job_id = %job_id, request_id = %extract_request_id(&message).unwrap_or_default(), error = %message, "heuristic record failed");
                summary.errors.push((job_id.clone(), message));
            }
        }

        match store
            .update_job_with_heuristic(&job_id, patch.to_value())
            .await
        {
            Ok(()) => {
                tracing::info!(
                    job_id = %job_id,
                    location = patch.location.as_deref().unwrap_or(""),
                    total_compensation = patch.total_compensation.unwrap_or(0),
                    "heuristic updated"
                );
                summary.updated.push(job_id);
                summary.processed += 1;
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(job_id = %job_id, request_id = %extract_request_id(&message).unwrap_or_default(), error = %message, "heuristic update failed");
                summary.errors.push((job_id, message));
            }
        }
    }

    summary.remaining = store.count_pending_job_details().await.unwrap_or(None);
    tracing::info!(
        processed = summary.processed,
        updated = summary.updated.len(),
        remaining = summary.remaining.unwrap_or(0),
        "heuristic batch complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsignal_store::MemoryStore;

    fn row(description: &str) -> HeuristicRow {
        HeuristicRow {
            url: "https://boards.greenhouse.io/acme/jobs/1".into(),
            company: "Acme".into(),
            description: description.into(),
            ..HeuristicRow::default()
        }
    }

    fn build(row: &HeuristicRow) -> (HeuristicPatch, Vec<HeuristicConfig>) {
        build_heuristic_patch(
            row,
            &[],
            &FilterSettings::default(),
            &RemoteCompanies::default(),
            1_000,
        )
    }

    #[test]
    fn extracts_location_and_records_the_regex() {
        let (patch, records) = build(&row("Location: Denver, CO\nJoin our team."));
        assert_eq!(patch.location.as_deref(), Some("Denver, CO"));
        assert_eq!(patch.countries, vec!["United States".to_string()]);
        assert_eq!(patch.heuristic_version, HEURISTIC_VERSION);
        assert_eq!(patch.heuristic_attempts, 1);
        assert!(records
            .iter()
            .any(|r| r.field == HeuristicField::Location && r.regex != "hint:location"));
    }

    #[test]
    fn usd_range_averages_and_sets_currency() {
        let (patch, records) = build(&row(
            "# Software Engineer\n\nPay range $140,400 - $372,300 annually.",
        ));
        assert_eq!(patch.total_compensation, Some(256_350));
        assert_eq!(patch.compensation_unknown, Some(false));
        assert_eq!(patch.currency_code.as_deref(), Some("USD"));
        assert!(records.iter().any(|r| r.field == HeuristicField::Compensation));
    }

    #[test]
    fn inr_hint_sets_india_and_currency() {
        let (patch, _) = build(&row("Compensation: 24 LPA for the right candidate."));
        assert_eq!(patch.currency_code.as_deref(), Some("INR"));
        assert_eq!(patch.total_compensation, Some(2_400_000));
        assert_eq!(patch.locations, vec!["India".to_string()]);
        assert_eq!(patch.countries, vec!["India".to_string()]);
    }

    #[test]
    fn remote_rows_default_to_united_states() {
        let mut r = row("Fully remote role. Remote");
        r.remote = Some(true);
        let (patch, _) = build(&r);
        assert_eq!(patch.locations, vec!["Remote".to_string()]);
        assert_eq!(patch.countries, vec!["United States".to_string()]);
    }

    #[test]
    fn learned_regexes_are_consulted_first() {
        let learned = HeuristicConfig {
            domain: "boards.greenhouse.io".into(),
            field: HeuristicField::Location,
            regex: r"HQ:\s*(?P<location>[A-Z][a-z]+, [A-Z]{2})".into(),
        };
        let (patch, records) = build_heuristic_patch(
            &row("HQ: Austin, TX\nApply today"),
            &[learned.clone()],
            &FilterSettings::default(),
            &RemoteCompanies::default(),
            1_000,
        );
        assert_eq!(patch.location.as_deref(), Some("Austin, TX"));
        assert!(records.iter().any(|r| r.regex == learned.regex));
    }

    #[test]
    fn remote_company_overlay_forces_remote() {
        let companies = RemoteCompanies::from_names(["Acme"]);
        let (patch, _) = build_heuristic_patch(
            &row("Some role"),
            &[],
            &FilterSettings::default(),
            &companies,
            1_000,
        );
        assert_eq!(patch.remote, Some(true));
    }

    #[test]
    fn country_derivation_handles_provinces_and_states() {
        assert_eq!(
            derive_countries(&["Toronto, ON".into()]),
            vec!["Canada".to_string()]
        );
        assert_eq!(
            derive_countries(&["Austin, TX".into(), "Denver, Colorado".into()]),
            vec!["United States".to_string()]
        );
        assert_eq!(
            derive_countries(&["Berlin, Germany".into()]),
            vec!["Germany".to_string()]
        );
    }

    #[test]
    fn request_ids_are_extracted_from_store_errors() {
        assert_eq!(
            extract_request_id("boom [Request ID: req-123] failed").as_deref(),
            Some("req-123")
        );
        assert!(extract_request_id("plain error").is_none());
    }

    #[tokio::test]
    async fn batch_applies_patches_and_records_configs() {
        let memory = Arc::new(MemoryStore::new());
        memory.seed_pending_detail(PendingJobDetail {
            id: Some("job0000000000000000000000001".into()),
            url: "https://boards.greenhouse.io/acme/jobs/1".into(),
            title: Some("Software Engineer".into()),
            description: Some("Location: Denver, CO\nPay is $150,000 - $190,000.".into()),
            ..PendingJobDetail::default()
        });
        let store: Arc<dyn Store> = memory.clone();
        let summary = process_pending_job_details_batch(
            &store,
            &FilterSettings::default(),
            &RemoteCompanies::default(),
            25,
        )
        .await
        .unwrap();

        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.remaining, Some(0));
        let patches = memory.heuristic_patches("job0000000000000000000000001");
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0]["location"], "Denver, CO");
        assert!(!memory.heuristic_configs().is_empty());
    }
}
