use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use fetchfox_client::{CrawlRequest, Priority, ScrapeRequest, MAX_VISITS};
use jobsignal_common::{now_ms, JobSignalError, QueueStatus, ScrapeProvider, Site};
use jobsignal_store::{EnqueueScrapeUrls, ListQueuedScrapeUrls};

use crate::events::{log_provider_dispatch, log_sync_response};
use crate::greenhouse::{extract_greenhouse_job_urls, load_greenhouse_board};
use crate::normalize::{
    extract_raw_body_from_fetchfox_result, normalize_fetchfox_items,
};
use crate::payload::{
    build_request_snapshot, shrink_payload, trim_scrape_payload, ScrapeItems, ScrapePayload,
    TrimOptions,
};
use crate::traits::FetchFoxApi;

use super::{DetailBatch, DetailScrapeResult, ListingPayload, Scraper, ScraperDeps};

/// Extraction template handed to the provider: output field names mapped
/// to type hints.
pub fn job_template() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("job_title".into(), "str | None".into()),
        ("company".into(), "str | None".into()),
        ("description".into(), "str | None".into()),
        ("url".into(), "str | None".into()),
        ("location".into(), "str | None".into()),
        ("remote".into(), "True | False | None".into()),
        (
            "level".into(),
            "junior | mid | senior | staff | lead | principal | director | manager | vp | cxo | intern | None"
                .into(),
        ),
        ("salary".into(), "str | number | None".into()),
        ("total_compensation".into(), "number | None".into()),
        ("posted_at".into(), "datetime | date | str | None".into()),
    ])
}

/// Template-crawl adapter. One request crawls a site to a bounded depth
/// and returns structured rows; a crawl-only mode feeds discovered URLs
/// into the streaming-cloud detail queue.
pub struct FetchfoxScraper {
    api: Arc<dyn FetchFoxApi>,
    deps: ScraperDeps,
}

impl FetchfoxScraper {
    pub fn new(api: Arc<dyn FetchFoxApi>, deps: ScraperDeps) -> Self {
        Self { api, deps }
    }

    fn require_key(&self) -> Result<(), JobSignalError> {
        if self.deps.config.fetchfox_api_key.is_empty() {
            return Err(JobSignalError::config(
                "FETCHFOX_API_KEY env var is required for FetchFox",
            ));
        }
        Ok(())
    }

    /// Recursively gather candidate URLs from a crawl result.
    fn collect_urls(value: &Value, acc: &mut Vec<String>) {
        match value {
            Value::String(s) => {
                if s.starts_with("http") {
                    acc.push(s.trim().to_string());
                }
            }
            Value::Array(items) => {
                for item in items {
                    Self::collect_urls(item, acc);
                }
            }
            Value::Object(map) => {
                for key in ["url", "href", "link", "target", "job_url", "absolute_url"] {
                    if let Some(Value::String(s)) = map.get(key) {
                        if s.starts_with("http") {
                            acc.push(s.trim().to_string());
                        }
                    }
                }
                for key in [
                    "urls",
                    "links",
                    "visited_urls",
                    "visitedUrls",
                    "job_urls",
                    "jobUrls",
                    "results",
                    "items",
                    "data",
                    "hits",
                ] {
                    if let Some(nested) = map.get(key) {
                        Self::collect_urls(nested, acc);
                    }
                }
            }
            _ => {}
        }
    }

    /// Crawl-only discovery: queue job-detail URLs for the streaming
    /// crawler instead of extracting rows here.
    pub async fn crawl_site(&self, site: &Site) -> Result<ScrapePayload, JobSignalError> {
        self.require_key()?;
        let source_url = site.url.clone();
        if source_url.is_empty() {
            return Err(JobSignalError::config("site URL is required for crawl"));
        }
        let pattern = site.pattern.clone();
        let site_id = site.store_id().map(str::to_string);

        let mut skip_set: HashSet<String> = self
            .deps
            .seen_urls_for_site(&source_url, pattern.as_deref())
            .await
            .into_iter()
            .collect();
        for status in [QueueStatus::Pending, QueueStatus::Processing] {
            let queued = self
                .deps
                .store
                .list_queued_scrape_urls(ListQueuedScrapeUrls {
                    provider: Some(ScrapeProvider::Spidercloud),
                    status: Some(status),
                    site_id: site_id.clone(),
                    limit: 250,
                })
                .await
                .unwrap_or_default();
            skip_set.extend(queued.into_iter().map(|row| row.url));
        }

        let request = CrawlRequest {
            pattern: pattern.clone(),
            start_urls: vec![source_url.clone()],
            max_depth: 5,
            max_visits: MAX_VISITS,
            priority: Some(Priority {
                skip: skip_set.iter().cloned().collect(),
            }),
        };
        let request_snapshot = build_request_snapshot(
            serde_json::to_value(&request).unwrap_or(Value::Null),
            "fetchfox",
            "POST",
            "https://api.fetchfox.ai/crawl",
            Map::new(),
        );
        log_provider_dispatch("fetchfox", &source_url, Some("crawl"), pattern.as_deref());

        let started_at = now_ms();
        let result = self
            .api
            .crawl(&request)
            .await
            .map_err(|err| JobSignalError::from_provider_message("fetchfox", err.to_string()))?;
        let completed_at = now_ms();

        let mut crawled = Vec::new();
        Self::collect_urls(&result, &mut crawled);
        for row in normalize_fetchfox_items(&result, &self.deps.filters) {
            crawled.push(row.url);
        }
        let mut seen = HashSet::new();
        let unique: Vec<String> = crawled
            .into_iter()
            .filter(|u| u.starts_with("http"))
            .filter(|u| seen.insert(u.clone()))
            .collect();

        let existing = self
            .deps
            .store
            .find_existing_job_urls(&unique)
            .await
            .unwrap_or_default();
        skip_set.extend(existing);
        let candidates: Vec<String> = unique
            .iter()
            .filter(|u| !skip_set.contains(*u))
            .cloned()
            .collect();

        let mut enqueued = Vec::new();
        if !candidates.is_empty() {
            enqueued = self
                .deps
                .store
                .enqueue_scrape_urls(EnqueueScrapeUrls {
                    urls: candidates.clone(),
                    source_url: source_url.clone(),
                    provider: ScrapeProvider::Spidercloud,
                    site_id: site_id.clone(),
                    pattern: pattern.clone(),
                })
                .await
                .map(|r| r.queued)
                .unwrap_or_default();
        }

        log_sync_response(
            "fetchfox",
            "crawl",
            &source_url,
            &format!("urls={} queued={}", candidates.len(), enqueued.len()),
        );

        Ok(ScrapePayload {
            source_url: source_url.clone(),
            pattern,
            started_at,
            completed_at,
            provider: Some("fetchfox-crawl".into()),
            workflow_name: Some("FetchfoxSpidercloud".into()),
            request: Some(request_snapshot.clone()),
            provider_request: Some(serde_json::to_value(&request).unwrap_or(Value::Null)),
            response: Some(json!({
                "queued": enqueued.len(),
                "totalUrls": unique.len(),
                "rawResponse": shrink_payload(&result, 20_000),
            })),
            items: ScrapeItems {
                provider: Some("spidercloud".into()),
                job_urls: candidates,
                existing: skip_set.into_iter().collect(),
                queued: Some(!enqueued.is_empty()),
                queued_count: Some(enqueued.len()),
                seed_urls: vec![source_url],
                request: Some(request_snapshot),
                ..ScrapeItems::default()
            },
            ..ScrapePayload::default()
        })
    }
}

#[async_trait]
impl Scraper for FetchfoxScraper {
    fn provider(&self) -> ScrapeProvider {
        ScrapeProvider::Fetchfox
    }

    async fn scrape_site(
        &self,
        site: &Site,
        skip_urls: Option<Vec<String>>,
    ) -> Result<ScrapePayload, JobSignalError> {
        self.require_key()?;
        let pattern = site.pattern.clone();
        let skip = match skip_urls {
            Some(skip) => skip,
            None => {
                self.deps
                    .seen_urls_for_site(&site.url, pattern.as_deref())
                    .await
            }
        };

        let request = ScrapeRequest {
            pattern: pattern.clone(),
            start_urls: vec![site.url.clone()],
            max_depth: 5,
            max_visits: MAX_VISITS,
            template: job_template(),
            priority: Some(Priority { skip }),
            content_transform: Some("text_only".into()),
        };
        let request_snapshot = build_request_snapshot(
            serde_json::to_value(&request).unwrap_or(Value::Null),
            "fetchfox",
            "POST",
            "https://api.fetchfox.ai/scrape",
            Map::new(),
        );
        log_provider_dispatch("fetchfox", &site.url, None, pattern.as_deref());

        let started_at = now_ms();
        let result = match self.api.scrape(&request).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(url = %site.url, error = %err, "FetchFox scrape failed");
                json!({ "raw": "Scrape failed or returned invalid data" })
            }
        };
        let completed_at = now_ms();

        let normalized = normalize_fetchfox_items(&result, &self.deps.filters);
        log_sync_response(
            "fetchfox",
            "scrape",
            &site.url,
            &format!("items={}", normalized.len()),
        );

        let payload = ScrapePayload {
            source_url: site.url.clone(),
            pattern,
            started_at,
            completed_at,
            provider: Some("fetchfox".into()),
            request: Some(request_snapshot.clone()),
            items: ScrapeItems {
                normalized,
                raw: Some(result),
                provider: Some("fetchfox".into()),
                seed_urls: vec![site.url.clone()],
                request: Some(request_snapshot),
                ..ScrapeItems::default()
            },
            ..ScrapePayload::default()
        };
        Ok(trim_scrape_payload(&payload, &TrimOptions::default()).0)
    }

    async fn fetch_greenhouse_listing(
        &self,
        site: &Site,
    ) -> Result<ListingPayload, JobSignalError> {
        self.require_key()?;
        let request = ScrapeRequest {
            pattern: None,
            start_urls: vec![site.url.clone()],
            max_depth: 0,
            max_visits: 1,
            template: BTreeMap::from([("raw".to_string(), "str | None".to_string())]),
            priority: Some(Priority { skip: Vec::new() }),
            content_transform: Some("full_html".into()),
        };
        log_provider_dispatch("fetchfox", &site.url, Some("greenhouse_board"), None);

        let started_at = now_ms();
        let result = self
            .api
            .scrape(&request)
            .await
            .map_err(|err| JobSignalError::from_provider_message("fetchfox", err.to_string()))?;

        let raw_text = extract_raw_body_from_fetchfox_result(&result);
        let board = load_greenhouse_board(&raw_text).map_err(|err| {
            JobSignalError::Parse(format!("unable to parse Greenhouse board payload: {err}"))
        })?;
        let job_urls = extract_greenhouse_job_urls(&board, Some(&self.deps.filters));

        log_sync_response(
            "fetchfox",
            "greenhouse_board",
            &site.url,
            &format!("job_urls={}", job_urls.len()),
        );
        Ok(ListingPayload {
            raw: raw_text,
            job_urls,
            started_at,
            completed_at: now_ms(),
        })
    }

    async fn scrape_greenhouse_jobs(
        &self,
        batch: &DetailBatch,
    ) -> Result<DetailScrapeResult, JobSignalError> {
        self.require_key()?;
        let urls: Vec<String> = batch
            .urls
            .iter()
            .filter(|u| !u.trim().is_empty())
            .cloned()
            .collect();
        if urls.is_empty() {
            return Ok(DetailScrapeResult::default());
        }
        let source_url = if batch.source_url.is_empty() {
            urls[0].clone()
        } else {
            batch.source_url.clone()
        };

        let request = ScrapeRequest {
            pattern: None,
            start_urls: urls.clone(),
            max_depth: 1,
            max_visits: MAX_VISITS.min(urls.len().max(1) as u32),
            template: job_template(),
            priority: Some(Priority { skip: Vec::new() }),
            content_transform: Some("text_only".into()),
        };
        let request_snapshot = build_request_snapshot(
            serde_json::to_value(&request).unwrap_or(Value::Null),
            "fetchfox",
            "POST",
            "https://api.fetchfox.ai/scrape",
            Map::new(),
        );
        log_provider_dispatch("fetchfox", &source_url, Some("greenhouse_jobs"), None);

        let started_at = now_ms();
        let result = self
            .api
            .scrape(&request)
            .await
            .map_err(|err| JobSignalError::from_provider_message("fetchfox", err.to_string()))?;
        let completed_at = now_ms();

        let normalized = normalize_fetchfox_items(&result, &self.deps.filters);
        let payload = ScrapePayload {
            source_url: source_url.clone(),
            started_at,
            completed_at,
            provider: Some("fetchfox".into()),
            request: Some(request_snapshot.clone()),
            items: ScrapeItems {
                normalized,
                raw: Some(result),
                provider: Some("fetchfox".into()),
                seed_urls: urls,
                request: Some(request_snapshot),
                ..ScrapeItems::default()
            },
            ..ScrapePayload::default()
        };
        let (trimmed, _) = trim_scrape_payload(&payload, &TrimOptions::default());
        let jobs_scraped = trimmed.items.normalized.len();
        log_sync_response(
            "fetchfox",
            "greenhouse_jobs",
            &source_url,
            &format!("items={jobs_scraped}"),
        );
        Ok(DetailScrapeResult {
            scrape: Some(trimmed),
            jobs_scraped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deps_with_config, MockFetchFox};
    use jobsignal_common::Config;
    use jobsignal_store::MemoryStore;

    fn config() -> Config {
        Config {
            fetchfox_api_key: "ff-test".into(),
            ..Config::default()
        }
    }

    #[test]
    fn template_carries_all_job_fields() {
        let template = job_template();
        for key in [
            "job_title",
            "company",
            "description",
            "url",
            "location",
            "remote",
            "level",
            "salary",
            "total_compensation",
            "posted_at",
        ] {
            assert!(template.contains_key(key), "missing {key}");
        }
    }

    #[tokio::test]
    async fn crawl_site_skips_seen_queued_and_existing_urls() {
        let store = Arc::new(MemoryStore::new());
        let site_id = store.seed_site(Site {
            id: Some("k57d2hq8v3n9m1p4r6s8t0w2y4a6c8e0".into()),
            url: "https://example.com/jobs".into(),
            enabled: true,
            ..Site::default()
        });
        store.seed_seen_urls("https://example.com/jobs", &["https://example.com/job/seen"]);
        store.seed_job(jobsignal_common::JobInput {
            url: "https://example.com/job/existing".into(),
            title: "Software Engineer".into(),
            ..jobsignal_common::JobInput::default()
        });

        let api = MockFetchFox::with_result(json!({
            "urls": [
                "https://example.com/job/seen",
                "https://example.com/job/existing",
                "https://example.com/job/new",
            ]
        }));
        let scraper = FetchfoxScraper::new(Arc::new(api), deps_with_config(store.clone(), config()));
        let site = Site {
            id: Some(site_id),
            url: "https://example.com/jobs".into(),
            enabled: true,
            ..Site::default()
        };
        let payload = scraper.crawl_site(&site).await.unwrap();
        assert_eq!(
            payload.items.job_urls,
            vec!["https://example.com/job/new".to_string()]
        );
        assert_eq!(payload.items.queued_count, Some(1));
        // The queue row targets the streaming provider.
        let row = store
            .queue_row(ScrapeProvider::Spidercloud, "https://example.com/job/new")
            .unwrap();
        assert_eq!(row.source_url, "https://example.com/jobs");
    }

    #[tokio::test]
    async fn scrape_site_normalizes_template_rows() {
        let store = Arc::new(MemoryStore::new());
        let api = MockFetchFox::with_result(json!({
            "items": [
                {"job_title": "Software Engineer", "url": "https://example.com/job/1",
                 "location": "Austin, TX", "description": "Build things"},
                {"job_title": "Chef", "url": "https://example.com/job/2"}
            ]
        }));
        let scraper = FetchfoxScraper::new(Arc::new(api), deps_with_config(store, config()));
        let site = Site {
            url: "https://example.com/jobs".into(),
            enabled: true,
            ..Site::default()
        };
        let payload = scraper.scrape_site(&site, Some(vec![])).await.unwrap();
        assert_eq!(payload.items.normalized.len(), 1);
        assert_eq!(payload.items.normalized[0].url, "https://example.com/job/1");
    }

    #[tokio::test]
    async fn missing_key_is_a_config_error() {
        let store = Arc::new(MemoryStore::new());
        let scraper = FetchfoxScraper::new(
            Arc::new(MockFetchFox::default()),
            deps_with_config(store, Config::default()),
        );
        let site = Site {
            url: "https://example.com".into(),
            ..Site::default()
        };
        assert!(matches!(
            scraper.scrape_site(&site, None).await.unwrap_err(),
            JobSignalError::Config(_)
        ));
    }
}
