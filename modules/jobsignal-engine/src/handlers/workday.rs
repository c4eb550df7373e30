use jobsignal_common::SiteType;

use super::{dedupe, extract_hrefs, get_query_param, host_of, FetchHints, SiteHandler};

/// Workday-hosted boards (`*.myworkdayjobs.com` and branded mirrors).
/// Listings paginate with an `offset` query parameter; details live under
/// `/job/`.
pub struct WorkdayHandler;

const MAX_PAGINATION_LINKS: usize = 10;

impl SiteHandler for WorkdayHandler {
    fn name(&self) -> &'static str {
        "workday"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Workday
    }

    fn matches_url(&self, url: &str) -> bool {
        let host = host_of(url);
        host.contains("myworkdayjobs") || host.contains("workday")
    }

    fn is_listing_url(&self, url: &str) -> bool {
        !super::path_of(url).contains("/job/")
    }

    fn job_urls_from_html(&self, html: &str) -> Vec<String> {
        let hrefs = extract_hrefs(html, None);
        let mut jobs = Vec::new();
        let mut pagination = Vec::new();
        let mut offsets = std::collections::HashSet::new();
        for href in hrefs {
            let lower = href.to_lowercase();
            if lower.contains("/job/") {
                jobs.push(href);
                continue;
            }
            if let Some(offset) = get_query_param(&href, "offset") {
                if let Ok(offset) = offset.parse::<u64>() {
                    if offsets.insert(offset) && offsets.len() <= MAX_PAGINATION_LINKS {
                        pagination.push(href);
                    }
                }
            }
        }
        jobs.extend(pagination);
        dedupe(jobs)
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
}
