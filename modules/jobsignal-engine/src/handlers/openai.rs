use jobsignal_common::SiteType;

use super::{dedupe, extract_hrefs, host_of, path_of, FetchHints, SiteHandler};

/// openai.com careers. `/careers/search` renders the listing; details are
/// slug pages on openai.com itself (the Ashby-hosted apply flow is
/// excluded from queueing).
pub struct OpenAiCareersHandler;

impl SiteHandler for OpenAiCareersHandler {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Openai
    }

    fn matches_url(&self, url: &str) -> bool {
        let host = host_of(url);
        (host == "openai.com" || host == "www.openai.com") && path_of(url).starts_with("/careers")
    }

    fn is_listing_url(&self, url: &str) -> bool {
        path_of(url).contains("/careers/search")
    }

    fn job_urls_from_html(&self, html: &str) -> Vec<String> {
        let hrefs = extract_hrefs(html, Some("https://openai.com/careers/"));
        dedupe(
            hrefs
                .into_iter()
                .filter(|href| href.starts_with("https://openai.com/careers/"))
                .filter(|href| !href.contains("/careers/search"))
                .filter(|href| !href.contains("ashbyhq.com")),
        )
    }

    fn fetch_hints(&self, url: &str) -> FetchHints {
        if self.is_listing_url(url) {
            FetchHints::raw_html_chrome()
        } else {
            FetchHints::commonmark()
        }
    }

    fn filter_job_urls(&self, urls: &[String]) -> Vec<String> {
        dedupe(
            urls.iter()
                .map(|u| u.trim().to_string())
                .filter(|u| u.starts_with("https://openai.com/careers/"))
                .filter(|u| !u.contains("/careers/search")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_and_classifies_openai_urls() {
        let handler = OpenAiCareersHandler;
        let listing = "https://openai.com/careers/search/?q=engineer";
        let detail = "https://openai.com/careers/ai-support-engineer-san-francisco-san-francisco/";
        assert!(handler.matches_url(listing));
        assert!(handler.is_listing_url(listing));
        assert!(handler.matches_url(detail));
        assert!(!handler.is_listing_url(detail));
    }

    #[test]
    fn html_extraction_excludes_search_and_ashby_links() {
        let handler = OpenAiCareersHandler;
        let html = r#"
            <a href="/careers/ai-support-engineer-san-francisco-san-francisco/">role</a>
            <a href="https://openai.com/careers/search/?q=x">search</a>
            <a href="https://jobs.ashbyhq.com/openai/123">apply</a>
        "#;
        let links = handler.job_urls_from_html(html);
        assert_eq!(
            links,
            vec![
                "https://openai.com/careers/ai-support-engineer-san-francisco-san-francisco/"
                    .to_string()
            ]
        );
    }

    #[test]
    fn hints_use_raw_html_for_listing_and_commonmark_for_details() {
        let handler = OpenAiCareersHandler;
        assert_eq!(
            handler
                .fetch_hints("https://openai.com/careers/search/?q=engineer")
                .params
                .return_format,
            vec!["raw_html".to_string()]
        );
        assert_eq!(
            handler
                .fetch_hints("https://openai.com/careers/some-role/")
                .params
                .return_format,
            vec!["commonmark".to_string()]
        );
    }
}
