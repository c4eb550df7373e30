//! Markdown-level parsing shared by the normalizer and the heuristic
//! enricher: HTML conversion, navigation-chrome stripping, and the
//! best-effort hint extraction (title, level, locations, compensation,
//! remote flag).

use std::sync::LazyLock;

use regex::Regex;

use crate::greenhouse::html_unescape;

/// Navigation menus that careers sites repeat on every rendered page.
/// When a contiguous run of these terms shows up near the top of a
/// markdown body it is chrome, not content.
const NAV_MENU_SEQUENCE: &[&str] = &[
    "Welcome",
    "Culture",
    "Workplace Benefits",
    "Candidate Experience",
    "Diversity, Equity & Inclusion",
    "Learning & Development",
    "Pup Culture Blog",
    "Teams",
    "Engineering",
    "General & Administrative",
    "Marketing",
    "Product Design",
    "Product Management",
    "Sales",
    "Technical Solutions",
    "Early Career & Internships",
    "Locations",
    "Americas",
    "Asia Pacific",
    "EMEA",
    "Remote",
    "All Jobs",
];

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*#{1,6}\s+(?P<title>.+)$").unwrap());
static LEVEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?P<level>intern|junior|mid(?:-level)?|sr|senior|staff|principal|lead|manager|director|vp|cto|chief technology officer)\b",
    )
    .unwrap()
});
static LOCATION_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:location|office|based\s+in)\s*[:\-–]\s*(?P<location>[^\n,;]+(?:,\s*[^\n,;]+)?)")
        .unwrap()
});
static SIMPLE_LOCATION_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?P<location>[A-Z][\w .'-]+,\s*[A-Z][\w .'-]+)\s*$").unwrap()
});
static LOCATION_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:location|office|based in)\s*[:\-–]\s*").unwrap());
static SALARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\$\s*(?P<low>\d{2,3}(?:[.,]\d{3})*)(?:\s*[-–]\s*\$?\s*(?P<high>\d{2,3}(?:[.,]\d{3})*))?\s*(?P<period>per\s+year|per\s+annum|annual|yr|year|/year|per\s+hour|hr|hour)?",
    )
    .unwrap()
});
static SALARY_K_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:[$£€])?\s*(?P<low>\d{2,3})\s*k\s*(?:[-–]\s*(?P<high>\d{2,3})\s*k)?").unwrap()
});
static REMOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(remote(?:-first)?|hybrid|onsite|on-site)\b").unwrap());
static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static P_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</p\s*>").unwrap());
static P_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<p[^>]*>").unwrap());
static LI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<li[^>]*>").unwrap());
static SCRIPT_STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static SPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static MULTI_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lightweight hints pulled out of a markdown body. Callers treat every
/// field as an optional override.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkdownHints {
    pub title: Option<String>,
    pub level: Option<String>,
    pub location: Option<String>,
    pub locations: Vec<String>,
    pub remote: Option<bool>,
    pub compensation: Option<i64>,
    pub compensation_range: Option<CompensationRange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompensationRange {
    pub low: Option<i64>,
    pub high: Option<i64>,
}

impl CompensationRange {
    pub fn midpoint(&self) -> Option<i64> {
        match (self.low, self.high) {
            (Some(low), Some(high)) => Some((low + high) / 2),
            (Some(low), None) => Some(low),
            (None, Some(high)) => Some(high),
            (None, None) => None,
        }
    }
}

/// Convert an HTML fragment to markdown-ish plain text, preserving
/// paragraph breaks and list bullets.
pub fn html_to_markdown(raw_html: &str) -> String {
    if raw_html.is_empty() {
        return String::new();
    }
    let text = SCRIPT_STYLE_RE.replace_all(raw_html, " ");
    let text = BR_RE.replace_all(&text, "\n");
    let text = P_CLOSE_RE.replace_all(&text, "\n\n");
    let text = P_OPEN_RE.replace_all(&text, "");
    let text = LI_RE.replace_all(&text, "- ");
    let text = TAG_RE.replace_all(&text, " ");
    let text = html_unescape(&text);
    let text = SPACE_RUN_RE.replace_all(&text, " ");
    let text = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    BLANK_RUN_RE.replace_all(&text, "\n\n").trim().to_string()
}

fn normalize_nav_line(line: &str) -> &str {
    line.trim().trim_start_matches('#').trim()
}

fn is_nav_term(line: &str) -> bool {
    let normalized = normalize_nav_line(line);
    normalized == "Careers"
        || NAV_MENU_SEQUENCE
            .iter()
            .any(|term| normalized.eq_ignore_ascii_case(term))
}

/// Remove repeated navigation/footer menus scraped into markdown bodies.
/// Applied before hint parsing so menu entries never become phantom
/// locations.
pub fn strip_known_nav_blocks(markdown: &str) -> String {
    if markdown.is_empty() {
        return markdown.to_string();
    }

    let lines: Vec<&str> = markdown.lines().collect();
    let nav_indices: Vec<usize> = lines
        .iter()
        .take(200)
        .enumerate()
        .filter(|(_, line)| is_nav_term(line))
        .map(|(i, _)| i)
        .collect();
    if nav_indices.len() < 8 {
        return markdown.to_string();
    }

    let mut start = nav_indices[0];
    let end = *nav_indices.last().unwrap();
    if start > 120 || end - start > 200 {
        return markdown.to_string();
    }

    let segment = &lines[start..=end];
    let non_empty = segment.iter().filter(|l| !l.trim().is_empty()).count();
    if non_empty == 0 {
        return markdown.to_string();
    }
    let nav_like = segment.iter().filter(|l| is_nav_term(l)).count();
    if nav_like < 8.max(non_empty * 6 / 10) {
        return markdown.to_string();
    }

    while start > 0 && lines[start - 1].trim().is_empty() {
        start -= 1;
    }
    let mut stop = end + 1;
    while stop < lines.len() {
        if lines[stop].trim().is_empty() || is_nav_term(lines[stop]) {
            stop += 1;
            continue;
        }
        break;
    }

    let mut trimmed: Vec<&str> = Vec::new();
    trimmed.extend_from_slice(&lines[..start]);
    trimmed.extend_from_slice(&lines[stop..]);
    let joined = trimmed.join("\n");
    let out = joined.trim_matches('\n');
    if out.is_empty() {
        markdown.trim_matches('\n').to_string()
    } else {
        out.to_string()
    }
}

/// Split/clean raw location strings and drop implausible candidates
/// (benefit blurbs, salary lines, menu entries).
pub fn normalize_locations<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for value in raw {
        for part in value.as_ref().split(|c| c == ';' || c == '|' || c == '/') {
            let candidate = MULTI_SPACE_RE.replace_all(part.trim(), " ");
            let candidate = candidate
                .trim_matches(|c: char| c == ' ' || c == ',' || c == ';' || c == '\t')
                .to_string();
            if candidate.is_empty() {
                continue;
            }
            let lowered = candidate.to_lowercase();
            if matches!(lowered.as_str(), "unknown" | "n/a" | "na") {
                continue;
            }
            if candidate.len() < 3 || candidate.len() > 100 {
                continue;
            }
            if !is_plausible_location(&candidate) {
                continue;
            }
            if seen.insert(candidate.clone()) {
                out.push(candidate);
            }
        }
    }
    out.truncate(5);
    out
}

pub fn is_plausible_location(value: &str) -> bool {
    let lowered = value.to_lowercase();
    const BAD_TOKENS: &[&str] = &[
        "diversity",
        "equity",
        "inclusion",
        "benefits",
        "culture",
        "salary",
        "compensation",
        "pay",
        "package",
        "bonus",
        "range",
    ];
    if BAD_TOKENS.iter().any(|t| lowered.contains(t)) {
        return false;
    }
    if value.contains('$') || lowered.contains("401k") || lowered.contains("401(k") {
        return false;
    }
    if value.contains(',') {
        let segments: Vec<&str> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() > 3 {
            return false;
        }
        if segments.iter().any(|seg| seg.split_whitespace().count() > 3) {
            return false;
        }
        return true;
    }
    if lowered.contains("remote") {
        return true;
    }
    value.split_whitespace().count() <= 4
}

fn to_int(value: &str) -> Option<i64> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Extract lightweight hints from markdown text. Best-effort only.
pub fn parse_markdown_hints(markdown: &str) -> MarkdownHints {
    let mut hints = MarkdownHints::default();
    if markdown.is_empty() {
        return hints;
    }

    let markdown = strip_known_nav_blocks(markdown);

    let mut title_lower = String::new();
    if let Some(caps) = TITLE_RE.captures(&markdown) {
        let title = caps["title"].trim().to_string();
        if !title.is_empty() {
            title_lower = title.to_lowercase();
            hints.title = Some(title);
        }
    }

    if let Some(caps) = LEVEL_RE.captures(&markdown) {
        let level = caps["level"].to_lowercase();
        hints.level = Some(match level.as_str() {
            "sr" => "senior".to_string(),
            "mid-level" => "mid".to_string(),
            "chief technology officer" => "cto".to_string(),
            other => other.to_string(),
        });
    }

    // Line-based location guess first: short comma lines under the heading
    // that are not job-title or link noise.
    let mut location_candidates: Vec<String> = Vec::new();
    const TITLE_WORDS: &[&str] = &[
        "engineer",
        "developer",
        "manager",
        "designer",
        "product",
        "software",
        "data",
        "security",
        "analyst",
    ];
    for line in markdown.lines() {
        let t = line.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        let lower = t.to_lowercase();
        if lower.starts_with("job application for") {
            continue;
        }
        if t.contains('|') || lower.contains("career") || t.contains("http") {
            continue;
        }
        if t.split_whitespace().count() > 8 {
            continue;
        }
        if TITLE_WORDS.iter().any(|w| lower.contains(w)) {
            continue;
        }
        if !title_lower.is_empty() && lower.contains(&title_lower) {
            continue;
        }
        if t.contains(',') {
            let candidate = LOCATION_PREFIX_RE.replace(t, "").trim().to_string();
            if !candidate.is_empty() {
                location_candidates.extend(
                    candidate
                        .split(|c| c == ';' || c == '|' || c == '/')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty()),
                );
            }
        }
    }
    if location_candidates.is_empty() {
        if let Some(caps) = LOCATION_LABEL_RE
            .captures(&markdown)
            .or_else(|| SIMPLE_LOCATION_LINE_RE.captures(&markdown))
        {
            location_candidates.push(caps["location"].trim().to_string());
        }
    }
    let locations = normalize_locations(&location_candidates);
    if !locations.is_empty() {
        hints.location = locations.first().cloned();
        hints.locations = locations;
    }

    let has_physical_location = hints
        .locations
        .iter()
        .any(|loc| !loc.to_lowercase().contains("remote"));
    if let Some(caps) = REMOTE_RE.captures(&markdown) {
        let token = caps[1].to_lowercase();
        if token.contains("remote") {
            if !has_physical_location
                || hints
                    .locations
                    .iter()
                    .any(|loc| loc.to_lowercase().contains("remote"))
            {
                hints.remote = Some(true);
            }
        } else {
            hints.remote = Some(false);
        }
    }

    let mut candidates: Vec<i64> = Vec::new();
    let mut ranges: Vec<CompensationRange> = Vec::new();
    for caps in SALARY_RE.captures_iter(&markdown) {
        let period = caps
            .name("period")
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();
        if period.contains("hour") || period == "hr" {
            continue;
        }
        let low = caps.name("low").and_then(|m| to_int(m.as_str()));
        let high = caps.name("high").and_then(|m| to_int(m.as_str()));
        push_range(&mut candidates, &mut ranges, low, high);
    }
    for caps in SALARY_K_RE.captures_iter(&markdown) {
        let raw = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        if raw.to_lowercase().contains("401k") {
            continue;
        }
        let low = caps
            .name("low")
            .and_then(|m| to_int(m.as_str()))
            .map(|v| v * 1000);
        let high = caps
            .name("high")
            .and_then(|m| to_int(m.as_str()))
            .map(|v| v * 1000);
        push_range(&mut candidates, &mut ranges, low, high);
    }
    hints.compensation = candidates.into_iter().filter(|c| *c >= 1000).max();
    if !ranges.is_empty() {
        let best = ranges
            .into_iter()
            .max_by_key(|r| r.high.or(r.low).unwrap_or(0));
        hints.compensation_range = best.filter(|r| r.low.is_some() || r.high.is_some());
    }

    hints
}

fn push_range(
    candidates: &mut Vec<i64>,
    ranges: &mut Vec<CompensationRange>,
    low: Option<i64>,
    high: Option<i64>,
) {
    if low.is_none() && high.is_none() {
        return;
    }
    ranges.push(CompensationRange { low, high });
    match (low, high) {
        (Some(low), Some(high)) => candidates.push((low + high) / 2),
        (Some(low), None) => candidates.push(low),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_conversion_keeps_breaks_and_bullets() {
        let html = "<p>First</p><ul><li>one</li><li>two</li></ul><script>bad()</script>Line<br>break";
        let md = html_to_markdown(html);
        assert!(md.contains("First"));
        assert!(md.contains("- one"));
        assert!(md.contains("- two"));
        assert!(!md.contains("bad()"));
        assert!(md.contains("Line\nbreak"));
    }

    #[test]
    fn hints_pick_title_level_and_location() {
        let md = "# Senior Software Engineer\n\nSan Francisco, CA\n\nWe build things.";
        let hints = parse_markdown_hints(md);
        assert_eq!(hints.title.as_deref(), Some("Senior Software Engineer"));
        assert_eq!(hints.level.as_deref(), Some("senior"));
        assert_eq!(hints.location.as_deref(), Some("San Francisco, CA"));
    }

    #[test]
    fn remote_hint_respects_physical_locations() {
        let md = "# Software Engineer\n\nNew York, NY\n\nHybrid friendly, remote tooling.";
        let hints = parse_markdown_hints(md);
        // Physical location + remote mention elsewhere should not flip remote on.
        assert_ne!(hints.remote, Some(true));

        let remote_md = "# Software Engineer\n\nFully remote role. Remote";
        let hints = parse_markdown_hints(remote_md);
        assert_eq!(hints.remote, Some(true));
    }

    #[test]
    fn salary_ranges_average_to_midpoint() {
        let md = "# Software Engineer\n\nThe range is $140,400 - $372,300 per year.";
        let hints = parse_markdown_hints(md);
        assert_eq!(hints.compensation, Some(256_350));
        let range = hints.compensation_range.unwrap();
        assert_eq!(range.low, Some(140_400));
        assert_eq!(range.high, Some(372_300));
        assert_eq!(range.midpoint(), Some(256_350));
    }

    #[test]
    fn k_ranges_are_scaled_and_401k_ignored() {
        let md = "# Software Engineer\n\n120k-160k, plus 401k match.";
        let hints = parse_markdown_hints(md);
        assert_eq!(hints.compensation, Some(140_000));
    }

    #[test]
    fn hourly_rates_are_skipped() {
        let md = "# Software Engineer\n\n$45 per hour contract.";
        let hints = parse_markdown_hints(md);
        assert_eq!(hints.compensation, None);
    }

    #[test]
    fn nav_blocks_are_stripped() {
        let mut lines: Vec<String> = NAV_MENU_SEQUENCE.iter().map(|s| s.to_string()).collect();
        lines.push("### Careers".to_string());
        let body = format!("{}\n\n# Software Engineer\n\nAustin, TX", lines.join("\n"));
        let cleaned = strip_known_nav_blocks(&body);
        assert!(!cleaned.contains("Workplace Benefits"));
        assert!(cleaned.contains("# Software Engineer"));

        let hints = parse_markdown_hints(&body);
        // Menu entries must not become locations.
        assert_eq!(hints.location.as_deref(), Some("Austin, TX"));
    }

    #[test]
    fn implausible_locations_are_dropped() {
        let locations = normalize_locations([
            "Diversity, Equity & Inclusion",
            "$150,000 - $200,000",
            "Denver, CO",
            "Remote",
            "unknown",
        ]);
        assert_eq!(locations, vec!["Denver, CO".to_string(), "Remote".to_string()]);
    }
}
