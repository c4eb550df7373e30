use jobsignal_common::SiteType;

use super::{host_of, FetchHints, SiteHandler};

/// Ashby-hosted boards (`jobs.ashbyhq.com/{org}`). The posting API
/// returns the full board as JSON.
pub struct AshbyHandler;

impl AshbyHandler {
    fn org_slug(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        parsed
            .path()
            .split('/')
            .find(|p| !p.is_empty())
            .map(str::to_string)
    }
}

impl SiteHandler for AshbyHandler {
    fn name(&self) -> &'static str {
        "ashby"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Ashby
    }

    fn matches_url(&self, url: &str) -> bool {
        let host = host_of(url);
        host == "jobs.ashbyhq.com" || host == "api.ashbyhq.com"
    }

    fn is_listing_url(&self, url: &str) -> bool {
        // Board roots have exactly one path segment: the org slug.
        url::Url::parse(url)
            .map(|u| u.path().split('/').filter(|p| !p.is_empty()).count() == 1)
            .unwrap_or(false)
    }

    fn listing_api_url(&self, url: &str) -> Option<String> {
        let slug = Self::org_slug(url)?;
        Some(format!(
            "https://api.ashbyhq.com/posting-api/job-board/{slug}"
        ))
    }

    fn company_url(&self, url: &str) -> Option<String> {
        let slug = Self::org_slug(url)?;
        Some(format!("https://jobs.ashbyhq.com/{slug}"))
    }

    fn fetch_hints(&self, url: &str) -> FetchHints {
        if self.is_listing_url(url) || host_of(url) == "api.ashbyhq.com" {
            FetchHints::raw_html_chrome()
        } else {
            FetchHints::commonmark()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_api_and_company_urls() {
        let handler = AshbyHandler;
        let url = "https://jobs.ashbyhq.com/lambda";
        assert!(handler.matches_url(url));
        assert!(handler.is_listing_url(url));
        assert_eq!(
            handler.listing_api_url(url).as_deref(),
            Some("https://api.ashbyhq.com/posting-api/job-board/lambda")
        );
        assert_eq!(
            handler.company_url(url).as_deref(),
            Some("https://jobs.ashbyhq.com/lambda")
        );
    }

    #[test]
    fn extracts_links_from_board_json() {
        let handler = AshbyHandler;
        let payload = json!({
            "jobs": [
                {"jobUrl": "https://jobs.ashbyhq.com/lambda/senior-software-engineer"},
                {"applyUrl": "https://jobs.ashbyhq.com/lambda/security-engineer"}
            ]
        });
        assert_eq!(
            handler.job_urls_from_json(&payload),
            vec![
                "https://jobs.ashbyhq.com/lambda/senior-software-engineer".to_string(),
                "https://jobs.ashbyhq.com/lambda/security-engineer".to_string(),
            ]
        );
    }

    #[test]
    fn detail_pages_are_not_listings() {
        let handler = AshbyHandler;
        assert!(!handler.is_listing_url("https://jobs.ashbyhq.com/lambda/senior-engineer"));
    }
}
