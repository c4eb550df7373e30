use std::sync::LazyLock;

use regex::Regex;

use jobsignal_common::SiteType;

use super::{dedupe, extract_hrefs, get_query_param, host_of, path_of, FetchHints, SiteHandler};

static DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());

/// Confluent careers (`careers.confluent.io`). Job details live under
/// `/jobs/job/{uuid}`; `/jobs/united_states-*` slugs are location-filter
/// listing pages that must never be treated as details.
pub struct ConfluentHandler;

impl ConfluentHandler {
    /// The location-filter predicate: a `/jobs/{slug}` path whose slug
    /// starts with united_states and carries no digits.
    pub fn is_location_filter_url(url: &str) -> bool {
        if !host_of(url).ends_with("confluent.io") {
            return false;
        }
        let path = path_of(url);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for (idx, seg) in segments.iter().enumerate() {
            if *seg != "job" && *seg != "jobs" {
                continue;
            }
            if let Some(slug) = segments.get(idx + 1) {
                if (slug.starts_with("united_states") || slug.starts_with("united-states"))
                    && !DIGIT_RE.is_match(slug)
                {
                    return true;
                }
            }
        }
        false
    }
}

impl SiteHandler for ConfluentHandler {
    fn name(&self) -> &'static str {
        "confluent"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Confluent
    }

    fn matches_url(&self, url: &str) -> bool {
        host_of(url).ends_with("careers.confluent.io")
    }

    fn is_listing_url(&self, url: &str) -> bool {
        if Self::is_location_filter_url(url) {
            return true;
        }
        let path = path_of(url);
        path.trim_end_matches('/') == "/jobs" || path.is_empty() || path == "/"
    }

    fn job_urls_from_html(&self, html: &str) -> Vec<String> {
        let hrefs = extract_hrefs(html, Some("https://careers.confluent.io/jobs"));
        let mut out = Vec::new();
        for href in hrefs {
            let path = path_of(&href);
            if path.contains("/jobs/job/") {
                out.push(href);
                continue;
            }
            if path.starts_with("/jobs") && get_query_param(&href, "page").is_some() {
                out.push(href);
            }
        }
        dedupe(out)
    }

    fn fetch_hints(&self, url: &str) -> FetchHints {
        if self.is_listing_url(url) {
            let mut hints = FetchHints::raw_html_chrome();
            hints.params.preserve_host = Some(true);
            hints.extract_page_links = true;
            hints
        } else {
            FetchHints::commonmark()
        }
    }

    fn filter_job_urls(&self, urls: &[String]) -> Vec<String> {
        dedupe(
            urls.iter()
                .filter(|u| path_of(u).contains("/jobs/job/"))
                .filter(|u| !Self::is_location_filter_url(u))
                .map(|u| u.trim().to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_filter_slugs_are_listings() {
        for url in [
            "https://careers.confluent.io/jobs/united_states-engineering",
            "https://careers.confluent.io/jobs/united_states-united_arab_emirates",
            "https://careers.confluent.io/jobs/united_states-poland",
            "https://careers.confluent.io/jobs/united_states-finance_&_operations",
        ] {
            assert!(ConfluentHandler::is_location_filter_url(url), "{url}");
            assert!(ConfluentHandler.is_listing_url(url), "{url}");
        }
        assert!(!ConfluentHandler::is_location_filter_url(
            "https://careers.confluent.io/jobs/job/ca3f2007-6218-4d96-93a5-32230addfd31"
        ));
    }

    #[test]
    fn html_extraction_keeps_details_and_next_pages() {
        let handler = ConfluentHandler;
        let html = r#"
            <a href="https://careers.confluent.io/jobs/job/ca3f2007-6218-4d96-93a5-32230addfd31">Engineer</a>
            <a href="/jobs/?page=2">Next</a>
            <a href="https://careers.confluent.io/jobs/united_states-engineering">Filter</a>
        "#;
        let links = handler.job_urls_from_html(html);
        assert!(links
            .contains(&"https://careers.confluent.io/jobs/job/ca3f2007-6218-4d96-93a5-32230addfd31".to_string()));
        assert!(links.iter().any(|l| l.contains("page=2")));
        assert!(!links
            .iter()
            .any(|l| l.contains("united_states-engineering")));
    }

    #[test]
    fn filter_drops_location_filters() {
        let handler = ConfluentHandler;
        let urls = vec![
            "https://careers.confluent.io/jobs/job/abc-123".to_string(),
            "https://careers.confluent.io/jobs/united_states-engineering".to_string(),
        ];
        assert_eq!(
            handler.filter_job_urls(&urls),
            vec!["https://careers.confluent.io/jobs/job/abc-123".to_string()]
        );
    }
}
