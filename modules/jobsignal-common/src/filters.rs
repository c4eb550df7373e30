use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::config::resolve_config_path;

pub const DEFAULT_REQUIRED_KEYWORDS: &[&str] = &["engineer", "developer", "software", "development"];

const DEFAULT_US_TERMS: &[&str] = &[
    "united states",
    "united states of america",
    "usa",
    "u.s.",
    "u.s.a",
    "u.s",
    "america",
    "within the us",
    "anywhere in the us",
    "remote in us",
    "remote - us",
    "us remote",
    "us-based",
    "us only",
];

const DEFAULT_US_STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ", "NM",
    "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA",
    "WV", "WI", "WY", "PR", "GU", "VI",
];

const DEFAULT_US_STATE_NAMES: &[&str] = &[
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

const DEFAULT_US_CITY_HINTS: &[&str] = &[
    "new york",
    "san francisco",
    "seattle",
    "austin",
    "boston",
    "los angeles",
    "denver",
    "atlanta",
    "chicago",
    "portland",
    "san diego",
    "dallas",
    "houston",
    "miami",
    "phoenix",
    "raleigh",
    "washington",
    "san jose",
    "philadelphia",
    "salt lake city",
    "columbus",
    "charlotte",
];

const DEFAULT_NON_US_TERMS: &[&str] = &[
    "canada",
    "toronto",
    "ontario",
    "vancouver",
    "montreal",
    "london",
    "united kingdom",
    "uk",
    "ireland",
    "scotland",
    "wales",
    "australia",
    "new zealand",
    "singapore",
    "india",
    "pakistan",
    "bangladesh",
    "germany",
    "france",
    "spain",
    "italy",
    "netherlands",
    "sweden",
    "norway",
    "finland",
    "denmark",
    "poland",
    "mexico",
    "brazil",
    "argentina",
    "chile",
    "colombia",
    "peru",
    "japan",
    "china",
    "taiwan",
    "hong kong",
    "south korea",
    "korea",
    "vietnam",
    "thailand",
    "philippines",
    "malaysia",
    "indonesia",
    "south africa",
    "nigeria",
    "egypt",
    "israel",
];

const COMPANY_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "llc",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "company",
    "co",
    "plc",
    "gmbh",
    "sarl",
    "ag",
    "bv",
    "sa",
    "pte",
    "pty",
    "holdings",
    "group",
];

static ZIP_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{5}(?:-\d{4})?\b").unwrap());
static US_ABBREVIATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bU\.?S\.?A?\b").unwrap());
static COMPANY_NORMALIZE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Keyword and location policy for the title/location filters, merged
/// from defaults, `scraper_filters.yaml` and the env override.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    pub required_keywords: Vec<String>,
    pub allow_unknown_title: bool,
    pub require_us_only: bool,
    pub allow_unknown_location: bool,
    pub us_terms: Vec<String>,
    pub us_state_codes: Vec<String>,
    pub us_state_names: Vec<String>,
    pub us_city_hints: Vec<String>,
    pub non_us_terms: Vec<String>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            required_keywords: to_strings(DEFAULT_REQUIRED_KEYWORDS),
            allow_unknown_title: true,
            require_us_only: true,
            allow_unknown_location: true,
            us_terms: to_strings(DEFAULT_US_TERMS),
            us_state_codes: to_strings(DEFAULT_US_STATE_CODES),
            us_state_names: to_strings(DEFAULT_US_STATE_NAMES),
            us_city_hints: to_strings(DEFAULT_US_CITY_HINTS),
            non_us_terms: to_strings(DEFAULT_NON_US_TERMS),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl FilterSettings {
    /// Load from `scraper_filters.yaml` plus the `JOB_TITLE_REQUIRED_KEYWORDS`
    /// env override. Missing/malformed YAML yields the defaults.
    pub fn load() -> Self {
        let mut settings = Self::from_path(&resolve_config_path("scraper_filters.yaml"));
        if let Ok(raw) = std::env::var("JOB_TITLE_REQUIRED_KEYWORDS") {
            let parsed = parse_keyword_list(&raw);
            if !parsed.is_empty() {
                settings.required_keywords = parsed;
            }
        }
        settings
    }

    pub fn from_path(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_yaml_str(&raw),
            Err(_) => Self::default(),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Self {
        let data: Value = match serde_yaml::from_str(raw) {
            Ok(value) => value,
            Err(_) => return Self::default(),
        };
        let mut settings = Self::default();

        if let Some(title) = data.get("title_keywords") {
            if let Some(required) = normalize_list(title.get("required"), Case::Lower) {
                if !required.is_empty() {
                    settings.required_keywords = required;
                }
            }
            if let Some(flag) = title.get("allow_when_missing").and_then(Value::as_bool) {
                settings.allow_unknown_title = flag;
            }
        }

        if let Some(location) = data.get("location_filters") {
            if let Some(flag) = location.get("require_usa").and_then(Value::as_bool) {
                settings.require_us_only = flag;
            }
            if let Some(flag) = location.get("allow_when_missing").and_then(Value::as_bool) {
                settings.allow_unknown_location = flag;
            }
            merge_into(&mut settings.us_terms, location.get("us_terms"), Case::Lower);
            merge_into(
                &mut settings.us_state_codes,
                location.get("us_state_codes"),
                Case::Upper,
            );
            merge_into(
                &mut settings.us_state_names,
                location.get("us_state_names"),
                Case::Lower,
            );
            merge_into(
                &mut settings.us_city_hints,
                location.get("us_city_hints"),
                Case::Lower,
            );
            merge_into(
                &mut settings.non_us_terms,
                location.get("non_us_terms"),
                Case::Lower,
            );
        }

        settings
    }

    /// True when the title passes the required-keyword filter.
    ///
    /// No keywords configured allows everything; an unknown/empty title is
    /// allowed when the policy says so; otherwise at least one keyword must
    /// appear case-insensitively as a substring.
    pub fn title_matches_required_keywords(&self, title: Option<&str>) -> bool {
        if self.required_keywords.is_empty() {
            return true;
        }
        let title = match title {
            Some(t) if !t.trim().is_empty() => t,
            _ => return self.allow_unknown_title,
        };
        let normalized = title.to_lowercase();
        self.required_keywords
            .iter()
            .any(|keyword| normalized.contains(keyword.as_str()))
    }

    /// True when the location is US (or intentionally allowed while
    /// unknown). Non-US terms veto; bare "remote" without a US term falls
    /// back to the unknown-location policy.
    pub fn location_matches_usa(&self, location: Option<&str>) -> bool {
        if !self.require_us_only {
            return true;
        }
        let location = match location {
            Some(l) if !l.trim().is_empty() => l.trim(),
            _ => return self.allow_unknown_location,
        };
        let lower = location.to_lowercase();
        let upper = location.to_uppercase();

        if self.non_us_terms.iter().any(|term| lower.contains(term)) {
            return false;
        }
        if lower.contains("remote") && !self.us_terms.iter().any(|term| lower.contains(term)) {
            return self.allow_unknown_location;
        }
        if self.us_terms.iter().any(|term| lower.contains(term)) {
            return true;
        }
        if US_ABBREVIATION_RE.is_match(&upper) {
            return true;
        }
        if ZIP_CODE_RE.is_match(&lower) {
            return true;
        }
        if self.us_state_codes.iter().any(|code| {
            Regex::new(&format!(r"\b{}\b", regex::escape(code)))
                .map(|re| re.is_match(&upper))
                .unwrap_or(false)
        }) {
            return true;
        }
        if self.us_state_names.iter().any(|name| lower.contains(name)) {
            return true;
        }
        if self.us_city_hints.iter().any(|city| lower.contains(city)) {
            return true;
        }
        false
    }

    pub fn job_passes_filters(&self, title: Option<&str>, location: Option<&str>) -> bool {
        self.title_matches_required_keywords(title) && self.location_matches_usa(location)
    }
}

#[derive(Clone, Copy)]
enum Case {
    Lower,
    Upper,
}

fn normalize_list(value: Option<&Value>, case: Case) -> Option<Vec<String>> {
    let value = value?;
    let items: Vec<&str> = match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(arr) => arr.iter().filter_map(Value::as_str).collect(),
        _ => return Some(Vec::new()),
    };
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        let cased = match case {
            Case::Lower => trimmed.to_lowercase(),
            Case::Upper => trimmed.to_uppercase(),
        };
        if seen.insert(cased.clone()) {
            out.push(cased);
        }
    }
    Some(out)
}

fn merge_into(target: &mut Vec<String>, extra: Option<&Value>, case: Case) {
    if let Some(values) = normalize_list(extra, case) {
        for value in values {
            if !target.contains(&value) {
                target.push(value);
            }
        }
    }
}

fn parse_keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

// --- Remote-company overlay ---

/// Companies that are remote-first regardless of what a listing says,
/// loaded from `remote_companies.yaml` and matched on normalized names.
#[derive(Debug, Clone, Default)]
pub struct RemoteCompanies {
    names: HashSet<String>,
}

impl RemoteCompanies {
    pub fn load() -> Self {
        Self::from_path(&resolve_config_path("remote_companies.yaml"))
    }

    pub fn from_path(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_yaml_str(&raw),
            Err(_) => Self::default(),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Self {
        let data: Value = match serde_yaml::from_str(raw) {
            Ok(value) => value,
            Err(_) => return Self::default(),
        };
        let entries: Vec<&str> = match &data {
            Value::Array(arr) => arr.iter().filter_map(Value::as_str).collect(),
            Value::Object(_) => data
                .get("companies")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        let names = entries
            .into_iter()
            .map(normalize_company_name)
            .filter(|name| !name.is_empty())
            .collect();
        Self { names }
    }

    pub fn from_names<I: IntoIterator<Item = S>, S: AsRef<str>>(names: I) -> Self {
        Self {
            names: names
                .into_iter()
                .map(|n| normalize_company_name(n.as_ref()))
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn is_remote_company(&self, company: &str) -> bool {
        let normalized = normalize_company_name(company);
        !normalized.is_empty() && self.names.contains(&normalized)
    }
}

/// Lowercase, strip punctuation, and drop trailing legal suffixes so
/// "Dropbox, Inc." and "dropbox" compare equal.
pub fn normalize_company_name(value: &str) -> String {
    let cleaned = COMPANY_NORMALIZE_RE
        .replace_all(&value.to_lowercase(), " ")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        return cleaned;
    }
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    while let Some(last) = tokens.last() {
        if COMPANY_SUFFIXES.contains(last) {
            tokens.pop();
        } else {
            break;
        }
    }
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_filter_default_keywords() {
        let settings = FilterSettings::default();
        assert!(settings.title_matches_required_keywords(Some("Senior Software Engineer")));
        assert!(settings.title_matches_required_keywords(Some("Backend Developer")));
        assert!(!settings.title_matches_required_keywords(Some("Account Executive")));
        // Unknown titles are allowed by default.
        assert!(settings.title_matches_required_keywords(None));
        assert!(settings.title_matches_required_keywords(Some("  ")));
    }

    #[test]
    fn location_filter_accepts_us_markers() {
        let settings = FilterSettings::default();
        assert!(settings.location_matches_usa(Some("San Francisco, CA")));
        assert!(settings.location_matches_usa(Some("Austin, Texas")));
        assert!(settings.location_matches_usa(Some("Remote - US")));
        assert!(settings.location_matches_usa(Some("Seattle, WA 98101")));
        assert!(settings.location_matches_usa(None));
    }

    #[test]
    fn location_filter_rejects_non_us_terms() {
        let settings = FilterSettings::default();
        assert!(!settings.location_matches_usa(Some("Toronto, Canada")));
        assert!(!settings.location_matches_usa(Some("Bangalore, India")));
        assert!(!settings.location_matches_usa(Some("London, United Kingdom")));
    }

    #[test]
    fn bare_remote_falls_back_to_unknown_policy() {
        let mut settings = FilterSettings::default();
        assert!(settings.location_matches_usa(Some("Remote")));
        settings.allow_unknown_location = false;
        assert!(!settings.location_matches_usa(Some("Remote")));
        // With a US term attached it passes regardless.
        assert!(settings.location_matches_usa(Some("Remote - US")));
    }

    #[test]
    fn yaml_overrides_merge_with_defaults() {
        let settings = FilterSettings::from_yaml_str(
            "title_keywords:\n  required: [rust]\n  allow_when_missing: false\nlocation_filters:\n  non_us_terms: [mars]\n",
        );
        assert_eq!(settings.required_keywords, vec!["rust"]);
        assert!(!settings.allow_unknown_title);
        assert!(settings.non_us_terms.contains(&"mars".to_string()));
        // defaults still present
        assert!(settings.non_us_terms.contains(&"canada".to_string()));
    }

    #[test]
    fn company_normalization_strips_suffixes() {
        assert_eq!(normalize_company_name("Dropbox, Inc."), "dropbox");
        assert_eq!(normalize_company_name("ACME Holdings Group"), "acme");
        assert_eq!(normalize_company_name(""), "");
    }

    #[test]
    fn remote_company_overlay_matches_normalized_names() {
        let companies = RemoteCompanies::from_yaml_str("companies:\n  - Zapier\n  - GitLab Inc\n");
        assert!(companies.is_remote_company("Zapier, Inc."));
        assert!(companies.is_remote_company("gitlab"));
        assert!(!companies.is_remote_company("Stripe"));
    }
}
