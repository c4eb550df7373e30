use jobsignal_common::SiteType;
use spidercloud_client::{RequestMode, WaitForSelector};

use super::{dedupe, extract_hrefs, host_of, path_of, FetchHints, SiteHandler};

/// Avature-hosted careers portals (`*.avature.net` / `*.avature.com`).
/// `SearchJobs`/`SearchJobsData` render listings; details live under
/// `JobDetail/`. Account flows (SaveJob, Login, Register) never queue.
pub struct AvatureHandler;

const BLOCKED_TOKENS: &[&str] = &["/savejob", "/login", "/register", "/apply", "/signup"];

impl AvatureHandler {
    fn is_avature_host(url: &str) -> bool {
        let host = host_of(url);
        host == "avature.net"
            || host == "avature.com"
            || host.ends_with(".avature.net")
            || host.ends_with(".avature.com")
    }
}

impl SiteHandler for AvatureHandler {
    fn name(&self) -> &'static str {
        "avature"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Avature
    }

    fn matches_url(&self, url: &str) -> bool {
        Self::is_avature_host(url)
    }

    fn is_listing_url(&self, url: &str) -> bool {
        if !Self::is_avature_host(url) {
            return false;
        }
        // SearchJobsData is the XHR variant of SearchJobs; the prefix
        // check covers both.
        path_of(url).contains("/careers/searchjobs")
    }

    fn job_urls_from_html(&self, html: &str) -> Vec<String> {
        let hrefs = extract_hrefs(html, None);
        let mut out = Vec::new();
        for href in hrefs {
            let lower = href.to_lowercase();
            if BLOCKED_TOKENS.iter().any(|t| lower.contains(t)) {
                continue;
            }
            if lower.contains("/careers/jobdetail/") {
                out.push(href);
                continue;
            }
            // Pagination anchors carry a jobOffset parameter.
            if lower.contains("/careers/searchjobs") && lower.contains("joboffset=") {
                out.push(href);
            }
        }
        dedupe(out)
    }

    fn fetch_hints(&self, url: &str) -> FetchHints {
        if !Self::is_avature_host(url) {
            return FetchHints::default();
        }
        if self.is_listing_url(url) {
            // The listing is an SPA; wait until job links render.
            let mut hints = FetchHints::raw_html_chrome();
            hints.params.preserve_host = Some(true);
            hints.params.wait_for =
                Some(WaitForSelector::css("a[href*='/careers/JobDetail/']"));
            hints.extract_page_links = true;
            return hints;
        }
        let mut hints = FetchHints::commonmark();
        hints.params.request = Some(RequestMode::Chrome);
        hints
    }

    fn filter_job_urls(&self, urls: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        for url in urls {
            let cleaned = url.trim();
            if cleaned.is_empty() {
                continue;
            }
            if !Self::is_avature_host(cleaned) {
                continue;
            }
            let path = path_of(cleaned);
            if !path.contains("/careers/") {
                continue;
            }
            if BLOCKED_TOKENS.iter().any(|t| path.contains(t)) {
                continue;
            }
            if !path.contains("jobdetail") && !path.contains("searchjobs") {
                continue;
            }
            out.push(cleaned.to_string());
        }
        dedupe(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_avature_hosts_only() {
        let handler = AvatureHandler;
        assert!(handler.matches_url("https://company.avature.net/careers"));
        assert!(handler.matches_url("https://careers.avature.com/JobDetail/12345"));
        assert!(!handler.matches_url("https://avature-fake.com"));
        assert!(!handler.matches_url("https://company.com/careers"));
        assert!(!handler.matches_url("not-a-url"));
    }

    #[test]
    fn listing_detection_covers_both_endpoints() {
        let handler = AvatureHandler;
        assert!(handler.is_listing_url("https://bloomberg.avature.net/careers/SearchJobs/engineer?jobRecordsPerPage=12"));
        assert!(handler.is_listing_url("https://bloomberg.avature.net/careers/SearchJobsData/engineer?jobOffset=12"));
        assert!(handler.is_listing_url("https://bloomberg.avature.net/careers/searchjobs/engineer"));
        assert!(!handler.is_listing_url("https://bloomberg.avature.net/careers/JobDetail/Senior-Engineer/15548"));
    }

    #[test]
    fn html_extraction_keeps_details_and_pagination() {
        let handler = AvatureHandler;
        let html = r#"
            <a href="https://bloomberg.avature.net/careers/JobDetail/Senior-Engineer/15548">Apply</a>
            <a href="https://bloomberg.avature.net/careers/SearchJobs/engineer/?jobRecordsPerPage=12&jobOffset=12">2</a>
            <a href="https://bloomberg.avature.net/careers/SaveJob?jobId=15548">Save</a>
        "#;
        assert_eq!(
            handler.job_urls_from_html(html),
            vec![
                "https://bloomberg.avature.net/careers/JobDetail/Senior-Engineer/15548".to_string(),
                "https://bloomberg.avature.net/careers/SearchJobs/engineer/?jobRecordsPerPage=12&jobOffset=12"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn filter_rejects_account_flows() {
        let handler = AvatureHandler;
        let urls = vec![
            "https://company.avature.net/careers/JobDetail/12345".to_string(),
            "https://company.avature.net/careers/SaveJob/12345".to_string(),
            "https://company.avature.net/careers/Login".to_string(),
            "https://company.avature.net/careers/Register".to_string(),
            "https://company.avature.net/other/page".to_string(),
            "https://company.avature.net/careers/JobDetail/12345".to_string(),
        ];
        assert_eq!(
            handler.filter_job_urls(&urls),
            vec!["https://company.avature.net/careers/JobDetail/12345".to_string()]
        );
    }

    #[test]
    fn listing_hints_wait_for_job_links() {
        let handler = AvatureHandler;
        let hints = handler.fetch_hints("https://company.avature.net/careers/SearchJobs");
        assert_eq!(hints.params.request, Some(RequestMode::Chrome));
        assert_eq!(hints.params.return_format, vec!["raw_html".to_string()]);
        let selector = hints.params.wait_for.unwrap().selector.selector;
        assert!(selector.contains("/careers/JobDetail/"));

        let detail = handler.fetch_hints("https://company.avature.net/careers/JobDetail/12345");
        assert_eq!(detail.params.return_format, vec!["commonmark".to_string()]);
        assert!(detail.params.wait_for.is_none());

        assert_eq!(handler.fetch_hints("https://example.com/careers"), FetchHints::default());
    }
}
