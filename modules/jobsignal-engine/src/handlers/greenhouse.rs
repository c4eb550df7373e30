use jobsignal_common::SiteType;

use crate::greenhouse::{is_greenhouse_api_url, to_marketing_greenhouse_url};

use super::{get_query_param, host_of, FetchHints, SiteHandler};

/// Greenhouse boards. Marketing detail URLs carry `gh_jid`/`board`
/// parameters that rewrite to the boards-api JSON endpoint; the inverse
/// mapping feeds the apply-URL preference.
pub struct GreenhouseHandler;

impl GreenhouseHandler {
    fn board_param(url: &str) -> Option<String> {
        get_query_param(url, "board").or_else(|| {
            let host = host_of(url);
            if host.ends_with("greenhouse.io") {
                url::Url::parse(url).ok().and_then(|u| {
                    u.path()
                        .split('/')
                        .find(|p| !p.is_empty() && *p != "v1" && *p != "boards")
                        .map(str::to_string)
                })
            } else {
                None
            }
        })
    }
}

impl SiteHandler for GreenhouseHandler {
    fn name(&self) -> &'static str {
        "greenhouse"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Greenhouse
    }

    fn matches_url(&self, url: &str) -> bool {
        host_of(url).ends_with("greenhouse.io") || url.contains("gh_jid=")
    }

    fn is_listing_url(&self, url: &str) -> bool {
        let path = super::path_of(url);
        path.contains("/boards/") && path.ends_with("/jobs")
    }

    fn listing_api_url(&self, url: &str) -> Option<String> {
        if self.is_listing_url(url) {
            return Some(url.to_string());
        }
        None
    }

    /// Rewrite any Greenhouse-flavoured detail URL to the boards-api
    /// endpoint: `…?gh_jid=N&board=slug` and
    /// `boards.greenhouse.io/{slug}/jobs/{id}` both become
    /// `https://boards-api.greenhouse.io/v1/boards/{slug}/jobs/{id}`.
    fn api_detail_url(&self, url: &str) -> Option<String> {
        if is_greenhouse_api_url(url) {
            return Some(url.to_string());
        }
        if let Some(job_id) = get_query_param(url, "gh_jid") {
            let slug = Self::board_param(url)?;
            return Some(format!(
                "https://boards-api.greenhouse.io/v1/boards/{slug}/jobs/{job_id}"
            ));
        }
        let host = host_of(url);
        if host == "boards.greenhouse.io" {
            let parsed = url::Url::parse(url).ok()?;
            let parts: Vec<&str> = parsed.path().split('/').filter(|p| !p.is_empty()).collect();
            if parts.len() >= 3 && parts[1] == "jobs" {
                return Some(format!(
                    "https://boards-api.greenhouse.io/v1/boards/{}/jobs/{}",
                    parts[0], parts[2]
                ));
            }
        }
        None
    }

    fn company_url(&self, url: &str) -> Option<String> {
        to_marketing_greenhouse_url(url)
    }

    fn fetch_hints(&self, url: &str) -> FetchHints {
        // Boards render JSON; details need a browser either way. The API
        // host must not be preserved or the redirect chain breaks.
        let mut hints = FetchHints::raw_html_chrome();
        if !is_greenhouse_api_url(url) {
            hints.params.preserve_host = Some(true);
        }
        hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_gh_jid_detail_urls() {
        let handler = GreenhouseHandler;
        let detail = "https://coreweave.com/careers/job?4607747006&board=coreweave&gh_jid=4607747006";
        assert!(handler.matches_url(detail));
        assert_eq!(
            handler.api_detail_url(detail).as_deref(),
            Some("https://boards-api.greenhouse.io/v1/boards/coreweave/jobs/4607747006")
        );
    }

    #[test]
    fn marketing_and_api_urls_invert() {
        let handler = GreenhouseHandler;
        let api = "https://boards-api.greenhouse.io/v1/boards/coreweave/jobs/4607747006";
        assert_eq!(
            handler.company_url(api).as_deref(),
            Some("https://boards.greenhouse.io/coreweave/jobs/4607747006")
        );
        assert_eq!(
            handler
                .api_detail_url("https://boards.greenhouse.io/coreweave/jobs/4607747006")
                .as_deref(),
            Some(api)
        );
    }

    #[test]
    fn listing_api_url_passes_board_endpoints_through() {
        let handler = GreenhouseHandler;
        assert_eq!(
            handler
                .listing_api_url("https://api.greenhouse.io/v1/boards/robinhood/jobs")
                .as_deref(),
            Some("https://api.greenhouse.io/v1/boards/robinhood/jobs")
        );
        assert!(handler
            .listing_api_url("https://boards.greenhouse.io/acme/jobs/1")
            .is_none());
    }

    #[test]
    fn hints_force_chrome_raw_html() {
        let handler = GreenhouseHandler;
        let api_hints =
            handler.fetch_hints("https://boards-api.greenhouse.io/v1/boards/acme/jobs/1");
        assert_eq!(api_hints.params.return_format, vec!["raw_html".to_string()]);
        assert_eq!(api_hints.params.preserve_host, Some(false));

        let marketing_hints =
            handler.fetch_hints("https://coreweave.com/careers/job?gh_jid=1&board=coreweave");
        assert_eq!(marketing_hints.params.preserve_host, Some(true));
    }
}
