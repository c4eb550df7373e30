use std::sync::LazyLock;

use regex::Regex;

use jobsignal_common::SiteType;
use spidercloud_client::RequestMode;

use super::{dedupe, host_of, path_of, FetchHints, SiteHandler};

static ASHBY_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://jobs\.ashbyhq\.com/notion/[0-9a-fA-F-]+").unwrap()
});

/// Notion's careers page. The listing renders cleanly as commonmark with
/// per-role links into Notion's Ashby board.
pub struct NotionCareersHandler;

impl SiteHandler for NotionCareersHandler {
    fn name(&self) -> &'static str {
        "notion"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Notion
    }

    fn matches_url(&self, url: &str) -> bool {
        let host = host_of(url);
        let host = host.trim_start_matches("www.");
        (host == "notion.com" || host == "notion.so") && path_of(url).starts_with("/careers")
    }

    fn is_listing_url(&self, url: &str) -> bool {
        self.matches_url(url)
    }

    /// Role links out of the commonmark rendering, with trailing markdown
    /// punctuation stripped.
    fn job_urls_from_markdown(&self, markdown: &str) -> Vec<String> {
        dedupe(
            ASHBY_LINK_RE
                .find_iter(markdown)
                .map(|m| m.as_str().trim_end_matches([')', ']', '.']).to_string()),
        )
    }

    fn fetch_hints(&self, _url: &str) -> FetchHints {
        let mut hints = FetchHints::commonmark();
        hints.params.request = Some(RequestMode::Basic);
        hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_notion_careers() {
        let handler = NotionCareersHandler;
        assert!(handler.matches_url("https://www.notion.com/careers"));
        assert!(handler.is_listing_url("https://www.notion.com/careers"));
        assert!(!handler.matches_url("https://www.notion.com/product"));
    }

    #[test]
    fn markdown_links_survive_trailing_junk() {
        let handler = NotionCareersHandler;
        let markdown = r#"
## Open Positions
* Role A (https://jobs.ashbyhq.com/notion/a003d9b2-bc51-4f5b-8bca-068f10114308)
* Role B https://jobs.ashbyhq.com/notion/87b03f55-c420-44ed-a9db-61519ea03fa5)
* Role C https://jobs.ashbyhq.com/notion/c49b5c9b-6646-4a13-af57-ed522d15cdf7)
[External](https://example.com)
"#;
        let mut links = handler.job_urls_from_markdown(markdown);
        links.sort();
        assert_eq!(
            links,
            vec![
                "https://jobs.ashbyhq.com/notion/87b03f55-c420-44ed-a9db-61519ea03fa5".to_string(),
                "https://jobs.ashbyhq.com/notion/a003d9b2-bc51-4f5b-8bca-068f10114308".to_string(),
                "https://jobs.ashbyhq.com/notion/c49b5c9b-6646-4a13-af57-ed522d15cdf7".to_string(),
            ]
        );
    }

    #[test]
    fn hints_prefer_basic_commonmark() {
        let handler = NotionCareersHandler;
        let hints = handler.fetch_hints("https://www.notion.com/careers");
        assert_eq!(hints.params.return_format, vec!["commonmark".to_string()]);
        assert_eq!(hints.params.request, Some(RequestMode::Basic));
    }
}
