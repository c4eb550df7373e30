use serde_json::Value;

use jobsignal_common::SiteType;

use super::{
    dedupe, get_query_param, host_of, path_of, set_query_param, FetchHints, SiteHandler,
};

const HOST: &str = "careers.docusign.com";
const LISTING_PATH: &str = "/api/jobs";
const JOB_DETAIL_PATH: &str = "/jobs/";

/// Docusign careers. `/api/jobs` returns a paged JSON listing with a
/// total count; details come from `meta_data.canonical_url` or slugs.
pub struct DocusignHandler;

impl DocusignHandler {
    fn extract_job_url(data: &serde_json::Map<String, Value>) -> Option<String> {
        if let Some(Value::Object(meta)) = data.get("meta_data") {
            if let Some(Value::String(canonical)) = meta.get("canonical_url") {
                if !canonical.trim().is_empty() {
                    return Some(canonical.trim().to_string());
                }
            }
        }
        for key in ["canonical_url", "jobUrl", "postingUrl", "url"] {
            if let Some(Value::String(url)) = data.get(key) {
                if !url.trim().is_empty() {
                    return Some(url.trim().to_string());
                }
            }
        }
        let slug = data
            .get("slug")
            .or_else(|| data.get("req_id"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())?;
        let base = format!("https://{HOST}/jobs/{}", slug.trim());
        if let Some(Value::String(language)) = data.get("language") {
            if !language.trim().is_empty() {
                return Some(format!("{base}?lang={}", language.trim()));
            }
        }
        Some(base)
    }

    fn display_limit(payload: &Value) -> usize {
        payload
            .get("filter")
            .and_then(|f| f.get("displayLimit"))
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(0)
    }
}

impl SiteHandler for DocusignHandler {
    fn name(&self) -> &'static str {
        "docusign"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Docusign
    }

    fn matches_url(&self, url: &str) -> bool {
        if !host_of(url).ends_with(HOST) {
            return false;
        }
        let path = path_of(url);
        path.starts_with(LISTING_PATH) || path.contains(JOB_DETAIL_PATH)
    }

    fn is_listing_url(&self, url: &str) -> bool {
        path_of(url).starts_with(LISTING_PATH)
    }

    fn listing_api_url(&self, url: &str) -> Option<String> {
        if self.matches_url(url) && self.is_listing_url(url) {
            return Some(url.to_string());
        }
        None
    }

    fn job_urls_from_json(&self, payload: &Value) -> Vec<String> {
        let Some(jobs) = payload.get("jobs").and_then(Value::as_array) else {
            return Vec::new();
        };
        let mut urls = Vec::new();
        for job in jobs {
            let data = match job.get("data") {
                Some(Value::Object(data)) => data,
                _ => match job.as_object() {
                    Some(map) => map,
                    None => continue,
                },
            };
            if let Some(url) = Self::extract_job_url(data) {
                urls.push(url);
            }
        }
        dedupe(urls)
    }

    /// Page 2..N listing URLs derived from the total count and page size.
    fn pagination_urls_from_json(&self, payload: &Value, source_url: Option<&str>) -> Vec<String> {
        let total = payload
            .get("totalCount")
            .and_then(Value::as_u64)
            .or_else(|| payload.get("count").and_then(Value::as_u64))
            .unwrap_or(0) as usize;
        if total == 0 {
            return Vec::new();
        }
        let mut page_size = payload
            .get("jobs")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        if page_size == 0 {
            page_size = Self::display_limit(payload);
        }
        if page_size == 0 {
            return Vec::new();
        }
        let Some(source_url) = source_url else {
            return Vec::new();
        };
        let total_pages = total.div_ceil(page_size).max(1);
        let current = get_query_param(source_url, "page")
            .and_then(|p| p.parse::<usize>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        if current >= total_pages {
            return Vec::new();
        }
        (current + 1..=total_pages)
            .map(|page| set_query_param(source_url, "page", &page.to_string()))
            .collect()
    }

    fn fetch_hints(&self, url: &str) -> FetchHints {
        if !self.matches_url(url) {
            return FetchHints::default();
        }
        if self.is_listing_url(url) {
            let mut hints = FetchHints::raw_html_chrome();
            hints.params.preserve_host = Some(true);
            hints.extract_page_links = true;
            hints
        } else {
            let mut hints = FetchHints::commonmark();
            hints.params.request = Some(spidercloud_client::RequestMode::Chrome);
            hints.extract_page_links = true;
            hints
        }
    }

    fn filter_job_urls(&self, urls: &[String]) -> Vec<String> {
        dedupe(
            urls.iter()
                .map(|u| u.trim().to_string())
                .filter(|u| host_of(u).ends_with(HOST))
                .filter(|u| path_of(u).contains(JOB_DETAIL_PATH)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_urls_prefer_canonical_then_slug() {
        let handler = DocusignHandler;
        let payload = json!({
            "jobs": [
                {"data": {"meta_data": {"canonical_url": "https://careers.docusign.com/jobs/27526"}}},
                {"data": {"slug": "27999", "language": "en-us"}},
                {"data": {"title": "no url"}}
            ]
        });
        assert_eq!(
            handler.job_urls_from_json(&payload),
            vec![
                "https://careers.docusign.com/jobs/27526".to_string(),
                "https://careers.docusign.com/jobs/27999?lang=en-us".to_string(),
            ]
        );
    }

    #[test]
    fn pagination_counts_pages_from_totals() {
        let handler = DocusignHandler;
        let payload = json!({
            "totalCount": 45,
            "jobs": [{}, {}, {}, {}, {}, {}, {}, {}, {}, {}],
        });
        let source = "https://careers.docusign.com/api/jobs?page=1";
        let pages = handler.pagination_urls_from_json(&payload, Some(source));
        assert_eq!(pages.len(), 4); // pages 2..=5
        assert!(pages[0].contains("page=2"));
        assert!(pages[3].contains("page=5"));

        // Already on the last page: nothing further.
        let last = "https://careers.docusign.com/api/jobs?page=5";
        assert!(handler
            .pagination_urls_from_json(&payload, Some(last))
            .is_empty());
    }

    #[test]
    fn filter_requires_docusign_detail_paths() {
        let handler = DocusignHandler;
        let urls = vec![
            "https://careers.docusign.com/jobs/27526".to_string(),
            "https://careers.docusign.com/api/jobs?page=2".to_string(),
            "https://elsewhere.com/jobs/1".to_string(),
        ];
        assert_eq!(
            handler.filter_job_urls(&urls),
            vec!["https://careers.docusign.com/jobs/27526".to_string()]
        );
    }
}
