//! Deterministic test doubles: mock provider APIs and ready-made
//! dependency bags. No network, no keys, no sleeping.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use fetchfox_client::{CrawlRequest, FetchFoxError, ScrapeRequest};
use firecrawl_client::{
    BatchJob, BatchOptions, BatchStatus, FirecrawlError, ScrapeFormat, WebhookConfig,
};
use jobsignal_common::{Config, FilterSettings, RuntimeConfig};
use jobsignal_store::MemoryStore;
use spidercloud_client::{ScrapeParams, SpiderCloudError, SpiderEvent};

use crate::events::TracingSink;
use crate::scrapers::ScraperDeps;
use crate::traits::{FetchFoxApi, FirecrawlApi, ListingFetcher, SpiderApi};

/// Dependency bag over a memory store, with every provider key set.
pub fn deps_with_store(store: Arc<MemoryStore>) -> ScraperDeps {
    deps_with_config(
        store,
        Config {
            spider_api_key: "sk-test".into(),
            firecrawl_api_key: "fk-test".into(),
            fetchfox_api_key: "ff-test".into(),
            convex_url: "https://happy-otter-123.convex.cloud".into(),
            ..Config::default()
        },
    )
}

pub fn deps_with_config(store: Arc<MemoryStore>, config: Config) -> ScraperDeps {
    ScraperDeps {
        store,
        config: Arc::new(config),
        runtime: RuntimeConfig::default(),
        filters: Arc::new(FilterSettings::default()),
        events: Arc::new(TracingSink),
    }
}

// --- SpiderCloud ---

#[derive(Clone, Default)]
pub struct MockSpider {
    events: Arc<Vec<SpiderEvent>>,
    per_url: Arc<std::collections::HashMap<String, Vec<SpiderEvent>>>,
    proxies: Arc<Mutex<Vec<Option<String>>>>,
}

impl MockSpider {
    /// Every scrape returns these events.
    pub fn returning(events: Vec<SpiderEvent>) -> Self {
        Self {
            events: Arc::new(events),
            ..Self::default()
        }
    }

    /// Per-URL responses; URLs without an entry get the shared events.
    pub fn per_url(map: std::collections::HashMap<String, Vec<SpiderEvent>>) -> Self {
        Self {
            per_url: Arc::new(map),
            ..Self::default()
        }
    }

    /// Every scrape renders a captcha wall carrying `marker`.
    pub fn always_captcha(marker: &str) -> Self {
        Self::returning(vec![SpiderEvent {
            title: Some(marker.to_string()),
            ..SpiderEvent::default()
        }])
    }

    /// Proxy parameter observed per call, in order.
    pub fn seen_proxies(&self) -> Vec<Option<String>> {
        self.proxies.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpiderApi for MockSpider {
    async fn scrape_url(
        &self,
        url: &str,
        params: &ScrapeParams,
    ) -> Result<Vec<SpiderEvent>, SpiderCloudError> {
        self.proxies.lock().unwrap().push(params.proxy.clone());
        if let Some(events) = self.per_url.get(url) {
            return Ok(events.clone());
        }
        Ok(self.events.as_ref().clone())
    }
}

/// ListingFetcher returning a fixed body.
pub struct StaticListing {
    body: String,
}

impl StaticListing {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
        }
    }
}

#[async_trait]
impl ListingFetcher for StaticListing {
    async fn get_text(&self, _url: &str) -> anyhow::Result<String> {
        Ok(self.body.clone())
    }
}

// --- Firecrawl ---

#[derive(Default)]
pub struct MockFirecrawl {
    job_id: Option<String>,
    documents: Vec<Value>,
    failure: Mutex<Option<FirecrawlError>>,
    started: Mutex<Vec<Value>>,
}

impl MockFirecrawl {
    pub fn with_job_id(job_id: &str) -> Self {
        Self {
            job_id: Some(job_id.to_string()),
            ..Self::default()
        }
    }

    pub fn with_documents(documents: Vec<Value>) -> Self {
        Self {
            documents,
            ..Self::default()
        }
    }

    pub fn failing(error: FirecrawlError) -> Self {
        Self {
            failure: Mutex::new(Some(error)),
            ..Self::default()
        }
    }

    pub fn started_requests(&self) -> Vec<Value> {
        self.started.lock().unwrap().clone()
    }

    fn take_failure(&self) -> Option<FirecrawlError> {
        self.failure.lock().unwrap().take()
    }

    fn status(&self) -> BatchStatus {
        serde_json::from_value(json!({
            "status": "completed",
            "total": self.documents.len(),
            "completed": self.documents.len(),
            "data": self.documents,
        }))
        .unwrap_or_default()
    }
}

#[async_trait]
impl FirecrawlApi for MockFirecrawl {
    async fn start_batch_scrape(
        &self,
        urls: &[String],
        _formats: &[ScrapeFormat],
        webhook: Option<&WebhookConfig>,
        _options: &BatchOptions,
    ) -> Result<BatchJob, FirecrawlError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.started.lock().unwrap().push(json!({
            "urls": urls,
            "webhook": webhook.map(|w| w.url.clone()),
        }));
        let id = self.job_id.clone().unwrap_or_else(|| "mock-job".into());
        Ok(serde_json::from_value(json!({ "id": id })).unwrap())
    }

    async fn batch_scrape(
        &self,
        _urls: &[String],
        _formats: &[ScrapeFormat],
        _options: &BatchOptions,
    ) -> Result<BatchStatus, FirecrawlError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(self.status())
    }

    async fn get_batch_scrape_status(&self, _job_id: &str) -> Result<BatchStatus, FirecrawlError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(self.status())
    }
}

// --- FetchFox ---

#[derive(Default)]
pub struct MockFetchFox {
    result: Value,
    requests: Mutex<Vec<Value>>,
}

impl MockFetchFox {
    pub fn with_result(result: Value) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchFoxApi for MockFetchFox {
    async fn scrape(&self, request: &ScrapeRequest) -> Result<Value, FetchFoxError> {
        self.requests
            .lock()
            .unwrap()
            .push(serde_json::to_value(request).unwrap_or(Value::Null));
        Ok(self.result.clone())
    }

    async fn crawl(&self, request: &CrawlRequest) -> Result<Value, FetchFoxError> {
        self.requests
            .lock()
            .unwrap()
            .push(serde_json::to_value(request).unwrap_or(Value::Null));
        Ok(self.result.clone())
    }
}
