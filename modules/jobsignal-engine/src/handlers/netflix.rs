use serde_json::Value;

use jobsignal_common::SiteType;

use super::{
    dedupe, extract_hrefs, extract_pre_json, host_of, job_urls_from_json_default, FetchHints,
    SiteHandler,
};

/// Netflix careers (`explore.jobs.netflix.net`). The listing mirrors an
/// `api/apply/v2/jobs` endpoint returning a positions payload with a
/// total count; pagination is synthesized as `start=` offsets.
pub struct NetflixHandler;

const PAGE_SIZE: u64 = 10;
const HOST: &str = "explore.jobs.netflix.net";

impl NetflixHandler {
    fn api_url(query: &str, domain: &str, start: u64) -> String {
        let mut url = url::Url::parse(&format!("https://{HOST}/api/apply/v2/jobs")).unwrap();
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("domain", if domain.is_empty() { "netflix.com" } else { domain });
            if !query.is_empty() {
                qp.append_pair("query", query);
            }
            qp.append_pair("start", &start.to_string());
            qp.append_pair("num", &PAGE_SIZE.to_string());
        }
        url.to_string()
    }

    fn pagination_from_payload(payload: &Value) -> Vec<String> {
        let count = payload.get("count").and_then(Value::as_u64).unwrap_or(0);
        if count <= PAGE_SIZE {
            return Vec::new();
        }
        let query = payload
            .get("query")
            .and_then(|q| q.get("query"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let domain = payload
            .get("domain")
            .and_then(Value::as_str)
            .unwrap_or("netflix.com");
        let mut urls = Vec::new();
        let mut start = PAGE_SIZE;
        while start < count {
            urls.push(Self::api_url(query, domain, start));
            start += PAGE_SIZE;
        }
        urls
    }
}

impl SiteHandler for NetflixHandler {
    fn name(&self) -> &'static str {
        "netflix"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Netflix
    }

    fn matches_url(&self, url: &str) -> bool {
        host_of(url) == HOST
    }

    fn is_listing_url(&self, url: &str) -> bool {
        let path = super::path_of(url);
        path.starts_with("/careers") && !path.contains("/careers/job/")
            || path.contains("/api/apply/")
    }

    fn listing_api_url(&self, url: &str) -> Option<String> {
        if !self.matches_url(url) {
            return None;
        }
        if super::path_of(url).contains("/api/apply/") {
            return Some(url.to_string());
        }
        let parsed = url::Url::parse(url).ok()?;
        let mut query = String::new();
        let mut domain = "netflix.com".to_string();
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "query" => query = value.into_owned(),
                "domain" => domain = value.into_owned(),
                _ => {}
            }
        }
        Some(Self::api_url(&query, &domain, 0))
    }

    fn job_urls_from_json(&self, payload: &Value) -> Vec<String> {
        job_urls_from_json_default(payload)
    }

    fn pagination_urls_from_json(&self, payload: &Value, _source_url: Option<&str>) -> Vec<String> {
        Self::pagination_from_payload(payload)
    }

    fn job_urls_from_html(&self, html: &str) -> Vec<String> {
        // Browser-rendered API endpoints wrap the JSON in a <pre> block.
        if let Some(payload) = extract_pre_json(html) {
            let mut urls = self.job_urls_from_json(&payload);
            urls.extend(Self::pagination_from_payload(&payload));
            return dedupe(urls);
        }
        let mut urls: Vec<String> = extract_hrefs(html, Some(&format!("https://{HOST}/careers")))
            .into_iter()
            .filter(|href| {
                href.starts_with(&format!("https://{HOST}/careers/job/"))
                    || href.contains("/api/apply/v2/jobs")
            })
            .collect();
        urls.sort_by_key(|u| u.contains("/api/apply/"));
        dedupe(urls)
    }

    fn fetch_hints(&self, url: &str) -> FetchHints {
        if self.is_listing_url(url) {
            let mut hints = FetchHints::raw_html_chrome();
            hints.extract_page_links = true;
            hints
        } else {
            FetchHints::commonmark()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_api_url_carries_query_and_paging() {
        let handler = NetflixHandler;
        let url = "https://explore.jobs.netflix.net/careers?query=engineer&pid=790313345439&Region=ucan&domain=netflix.com&sort_by=date";
        assert!(handler.matches_url(url));
        assert!(handler.is_listing_url(url));
        let api = handler.listing_api_url(url).unwrap();
        assert!(api.contains("api/apply/v2/jobs"));
        assert!(api.contains("query=engineer"));
        assert!(api.contains("start=0"));
        assert!(api.contains("num=10"));
    }

    #[test]
    fn pre_json_listing_yields_jobs_and_pagination() {
        let handler = NetflixHandler;
        let html = r#"<html><pre>{"domain":"netflix.com","positions":[{"canonicalPositionUrl":"https://explore.jobs.netflix.net/careers/job/123"}],"count":15,"query":{"query":"engineer"}}</pre></html>"#;
        let links = handler.job_urls_from_html(html);
        assert!(links.contains(&"https://explore.jobs.netflix.net/careers/job/123".to_string()));
        assert!(links
            .iter()
            .any(|l| l.contains("api/apply/v2/jobs") && l.contains("start=10")));
    }

    #[test]
    fn pagination_stops_at_count() {
        let payload = serde_json::json!({
            "count": 35,
            "domain": "netflix.com",
            "query": {"query": "engineer"},
        });
        let pages = NetflixHandler::pagination_from_payload(&payload);
        assert_eq!(pages.len(), 3); // start=10,20,30
        assert!(pages.iter().all(|p| p.contains("num=10")));
    }
}
