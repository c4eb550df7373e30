use std::sync::LazyLock;

use regex::Regex;

use jobsignal_common::SiteType;

use super::{dedupe, extract_hrefs, get_query_param, host_of, path_of, FetchHints, SiteHandler};

static JOB_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/careers/list/\d+/?$").unwrap());

/// Uber careers (`uber.com/.../careers/list/`). Details are numeric ids
/// under the same path; pagination uses a `page` parameter.
pub struct UberCareersHandler;

impl SiteHandler for UberCareersHandler {
    fn name(&self) -> &'static str {
        "uber"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Uber
    }

    fn matches_url(&self, url: &str) -> bool {
        let host = host_of(url);
        (host == "www.uber.com" || host == "uber.com") && path_of(url).contains("/careers/")
    }

    fn is_listing_url(&self, url: &str) -> bool {
        let path = path_of(url);
        path.contains("/careers/list") && !JOB_PATH_RE.is_match(&path)
    }

    fn job_urls_from_html(&self, html: &str) -> Vec<String> {
        let hrefs = extract_hrefs(html, Some("https://www.uber.com/us/en/careers/list/"));
        let mut out = Vec::new();
        for href in hrefs {
            if JOB_PATH_RE.is_match(&path_of(&href)) {
                out.push(href);
                continue;
            }
            if path_of(&href).contains("/careers/list") && get_query_param(&href, "page").is_some() {
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
                .filter(|u| JOB_PATH_RE.is_match(&path_of(u)))
                .map(|u| u.trim().to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_and_detail_urls_are_distinguished() {
        let handler = UberCareersHandler;
        let listing = "https://www.uber.com/us/en/careers/list/?query=engineer&location=USA-California-San%20Francisco";
        assert!(handler.matches_url(listing));
        assert!(handler.is_listing_url(listing));
        assert!(!handler.is_listing_url("https://www.uber.com/us/en/careers/list/140717"));
    }

    #[test]
    fn html_extraction_finds_jobs_and_pagination() {
        let handler = UberCareersHandler;
        let html = r#"
            <a href="/us/en/careers/list/140717/">Engineer</a>
            <a href="https://www.uber.com/us/en/careers/list/?query=engineer&page=2">Next</a>
            <a href="https://www.uber.com/us/en/careers/teams/">Teams</a>
        "#;
        let links = handler.job_urls_from_html(html);
        assert!(links.iter().any(|l| l.contains("/careers/list/140717")));
        assert!(links.iter().any(|l| l.contains("page=2")));
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn filter_keeps_numeric_details_only() {
        let handler = UberCareersHandler;
        let urls = vec![
            "https://www.uber.com/us/en/careers/list/140717".to_string(),
            "https://www.uber.com/us/en/careers/list/?page=2".to_string(),
        ];
        assert_eq!(
            handler.filter_job_urls(&urls),
            vec!["https://www.uber.com/us/en/careers/list/140717".to_string()]
        );
    }
}
