use jobsignal_common::SiteType;

use super::{dedupe, extract_hrefs, get_query_param, host_of, path_of, FetchHints, SiteHandler};

/// Cisco careers (`careers.cisco.com`). Listings are `search-results`
/// pages paginated with a `from=` offset; details live under
/// `/global/en/job/`.
pub struct CiscoCareersHandler;

impl SiteHandler for CiscoCareersHandler {
    fn name(&self) -> &'static str {
        "cisco"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Cisco
    }

    fn matches_url(&self, url: &str) -> bool {
        host_of(url).ends_with("careers.cisco.com")
    }

    fn is_listing_url(&self, url: &str) -> bool {
        path_of(url).contains("search-results")
    }

    fn job_urls_from_html(&self, html: &str) -> Vec<String> {
        let hrefs = extract_hrefs(html, Some("https://careers.cisco.com/global/en/search-results"));
        let mut out = Vec::new();
        for href in hrefs {
            let path = path_of(&href);
            if path.contains("/global/en/job/") {
                out.push(href);
                continue;
            }
            if path.contains("search-results") && get_query_param(&href, "from").is_some() {
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
                .filter(|u| path_of(u).contains("/global/en/job/"))
                .map(|u| u.trim().to_string()),
        )
    }
}
