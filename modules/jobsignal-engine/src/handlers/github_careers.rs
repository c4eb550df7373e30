use serde_json::Value;

use jobsignal_common::SiteType;

use super::{dedupe, host_of, FetchHints, SiteHandler};

/// github.careers. The HTML listing mirrors an `/api/jobs` endpoint;
/// details are slug URLs with a language parameter.
pub struct GithubCareersHandler;

impl SiteHandler for GithubCareersHandler {
    fn name(&self) -> &'static str {
        "github_careers"
    }

    fn site_type(&self) -> SiteType {
        SiteType::GithubCareers
    }

    fn matches_url(&self, url: &str) -> bool {
        host_of(url).ends_with("github.careers")
    }

    fn is_listing_url(&self, url: &str) -> bool {
        let path = super::path_of(url);
        path.trim_end_matches('/') == "/api/jobs" || path.starts_with("/careers-home/jobs") && !path.contains("/jobs/")
    }

    /// Turn the HTML listing URL into the `/api/jobs` endpoint, dropping
    /// the `page` parameter so page one is canonical.
    fn listing_api_url(&self, url: &str) -> Option<String> {
        if !self.matches_url(url) {
            return None;
        }
        let parsed = url::Url::parse(url).ok()?;
        if parsed.path().trim_end_matches('/') == "/api/jobs" {
            return Some(url.to_string());
        }
        let host = parsed.host_str().unwrap_or("www.github.careers");
        let mut api = url::Url::parse(&format!("https://{host}/api/jobs")).ok()?;
        {
            let mut qp = api.query_pairs_mut();
            for (key, value) in parsed.query_pairs() {
                if key.eq_ignore_ascii_case("page") {
                    continue;
                }
                qp.append_pair(&key, &value);
            }
        }
        if api.query() == Some("") {
            api.set_query(None);
        }
        Some(api.to_string())
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
            let Some(slug) = data.get("slug").and_then(Value::as_str) else {
                continue;
            };
            if slug.trim().is_empty() {
                continue;
            }
            let language = data
                .get("language")
                .and_then(Value::as_str)
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .or_else(|| {
                    data.get("languages")
                        .and_then(Value::as_array)
                        .and_then(|langs| langs.first())
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| "en-us".to_string());
            urls.push(format!(
                "https://www.github.careers/careers-home/jobs/{}?lang={}",
                slug.trim(),
                language.to_lowercase()
            ));
        }
        dedupe(urls)
    }

    fn fetch_hints(&self, url: &str) -> FetchHints {
        if self.is_listing_url(url) {
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
    fn listing_api_url_strips_page_param() {
        let handler = GithubCareersHandler;
        let url =
            "https://www.github.careers/careers-home/jobs?keywords=engineer&sortBy=relevance&page=3";
        let api = handler.listing_api_url(url).unwrap();
        assert!(api.starts_with("https://www.github.careers/api/jobs?"));
        assert!(api.contains("keywords=engineer"));
        assert!(!api.contains("page="));

        assert_eq!(
            handler
                .listing_api_url("https://www.github.careers/api/jobs?keywords=rust")
                .as_deref(),
            Some("https://www.github.careers/api/jobs?keywords=rust")
        );
    }

    #[test]
    fn detail_urls_built_from_slugs_and_languages() {
        let handler = GithubCareersHandler;
        let payload = json!({
            "jobs": [
                {"data": {"slug": "4822", "language": "en-us"}},
                {"data": {"slug": "4867", "languages": ["EN-US", "fr"]}},
                {"data": {"slug": "4822", "language": "en-us"}}
            ]
        });
        assert_eq!(
            handler.job_urls_from_json(&payload),
            vec![
                "https://www.github.careers/careers-home/jobs/4822?lang=en-us".to_string(),
                "https://www.github.careers/careers-home/jobs/4867?lang=en-us".to_string(),
            ]
        );
    }
}
