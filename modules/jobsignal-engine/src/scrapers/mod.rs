//! Provider adapters behind one uniform contract. Each adapter is a
//! plain object over a dependencies struct — store handle, filter
//! policy, telemetry sink, configuration — and never touches
//! orchestration primitives.

mod fetchfox;
mod firecrawl;
mod spidercloud;

pub use fetchfox::{job_template, FetchfoxScraper};
pub use firecrawl::{
    job_posting_schema, webhook_events_for_kind, FirecrawlScraper, KIND_GREENHOUSE_LISTING,
    KIND_SITE_CRAWL,
};
pub use spidercloud::{SpidercloudScraper, CAPTCHA_PROXY_SEQUENCE, CAPTCHA_RETRY_LIMIT};

use std::sync::Arc;

use async_trait::async_trait;

use jobsignal_common::{Config, FilterSettings, JobSignalError, RuntimeConfig, ScrapeProvider, Site, SiteType};
use jobsignal_store::Store;

use crate::events::EventSink;
use crate::payload::ScrapePayload;

/// Result of a board-listing fetch: the raw body plus the detail URLs
/// extracted from it.
#[derive(Debug, Clone, Default)]
pub struct ListingPayload {
    pub raw: String,
    pub job_urls: Vec<String>,
    pub started_at: i64,
    pub completed_at: i64,
}

/// A leased batch of detail URLs to scrape.
#[derive(Debug, Clone, Default)]
pub struct DetailBatch {
    pub urls: Vec<String>,
    pub source_url: String,
    pub pattern: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Outcome of a detail batch.
#[derive(Debug, Clone, Default)]
pub struct DetailScrapeResult {
    pub scrape: Option<ScrapePayload>,
    pub jobs_scraped: usize,
}

/// Uniform adapter contract: one site scrape, one board-listing fetch,
/// one detail batch.
#[async_trait]
pub trait Scraper: Send + Sync {
    fn provider(&self) -> ScrapeProvider;

    async fn scrape_site(
        &self,
        site: &Site,
        skip_urls: Option<Vec<String>>,
    ) -> Result<ScrapePayload, JobSignalError>;

    async fn fetch_greenhouse_listing(&self, site: &Site)
        -> Result<ListingPayload, JobSignalError>;

    async fn scrape_greenhouse_jobs(
        &self,
        batch: &DetailBatch,
    ) -> Result<DetailScrapeResult, JobSignalError>;
}

/// Shared adapter dependencies.
#[derive(Clone)]
pub struct ScraperDeps {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub runtime: RuntimeConfig,
    pub filters: Arc<FilterSettings>,
    pub events: Arc<dyn EventSink>,
}

impl ScraperDeps {
    /// Seen-set lookup used to skip already-ingested URLs. Failures leave
    /// the skip list empty rather than failing the scrape.
    pub async fn seen_urls_for_site(&self, source_url: &str, pattern: Option<&str>) -> Vec<String> {
        if source_url.is_empty() {
            return Vec::new();
        }
        match self
            .store
            .list_seen_job_urls_for_site(source_url, pattern)
            .await
        {
            Ok(urls) => urls,
            Err(err) => {
                tracing::warn!(source_url, error = %err, "seen-url lookup failed");
                Vec::new()
            }
        }
    }
}

fn has_credential(provider: ScrapeProvider, config: &Config) -> bool {
    match provider {
        ScrapeProvider::Spidercloud => !config.spider_api_key.is_empty(),
        ScrapeProvider::Firecrawl => !config.firecrawl_api_key.is_empty(),
        ScrapeProvider::Fetchfox => !config.fetchfox_api_key.is_empty(),
    }
}

/// Pick the provider for a site. A declared provider must have its
/// credential configured — silent fallback across providers with
/// different correctness semantics is not allowed. Undeclared sites:
/// greenhouse boards prefer the streaming crawler, everything else the
/// batch-async crawler when a webhook ingress exists, then the template
/// crawler, then anything with credentials.
pub fn select_provider(site: &Site, config: &Config) -> Result<ScrapeProvider, JobSignalError> {
    if let Some(declared) = site.scrape_provider {
        if has_credential(declared, config) {
            return Ok(declared);
        }
        return Err(JobSignalError::config(format!(
            "{} credential is required for site {}",
            declared.as_str().to_uppercase(),
            site.url
        )));
    }

    if site.site_type == SiteType::Greenhouse && has_credential(ScrapeProvider::Spidercloud, config)
    {
        return Ok(ScrapeProvider::Spidercloud);
    }
    if has_credential(ScrapeProvider::Firecrawl, config) && config.webhook_http_base().is_some() {
        return Ok(ScrapeProvider::Firecrawl);
    }
    if has_credential(ScrapeProvider::Fetchfox, config) {
        return Ok(ScrapeProvider::Fetchfox);
    }
    for provider in [
        ScrapeProvider::Spidercloud,
        ScrapeProvider::Firecrawl,
        ScrapeProvider::Fetchfox,
    ] {
        if has_credential(provider, config) {
            return Ok(provider);
        }
    }
    Err(JobSignalError::config(
        "no scrape provider credentials configured",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(spider: &str, firecrawl: &str, fetchfox: &str, webhook: &str) -> Config {
        Config {
            spider_api_key: spider.into(),
            firecrawl_api_key: firecrawl.into(),
            fetchfox_api_key: fetchfox.into(),
            convex_http_url: webhook.into(),
            ..Config::default()
        }
    }

    fn site(site_type: SiteType, provider: Option<ScrapeProvider>) -> Site {
        Site {
            url: "https://example.com/jobs".into(),
            site_type,
            scrape_provider: provider,
            enabled: true,
            ..Site::default()
        }
    }

    #[test]
    fn declared_provider_wins_when_credentialed() {
        let config = config("sk", "fk", "xk", "https://x.convex.site");
        let site = site(SiteType::Generic, Some(ScrapeProvider::Fetchfox));
        assert_eq!(
            select_provider(&site, &config).unwrap(),
            ScrapeProvider::Fetchfox
        );
    }

    #[test]
    fn declared_provider_without_credential_is_a_config_error() {
        let config = config("", "fk", "xk", "https://x.convex.site");
        let site = site(SiteType::Greenhouse, Some(ScrapeProvider::Spidercloud));
        let err = select_provider(&site, &config).unwrap_err();
        assert!(matches!(err, JobSignalError::Config(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn greenhouse_defaults_to_streaming_cloud() {
        let config = config("sk", "fk", "xk", "https://x.convex.site");
        let site = site(SiteType::Greenhouse, None);
        assert_eq!(
            select_provider(&site, &config).unwrap(),
            ScrapeProvider::Spidercloud
        );
    }

    #[test]
    fn general_sites_prefer_batch_async_with_webhook_base() {
        let config1 = config("sk", "fk", "xk", "https://x.convex.site");
        let site = site(SiteType::Generic, None);
        assert_eq!(
            select_provider(&site, &config1).unwrap(),
            ScrapeProvider::Firecrawl
        );

        // Without a webhook ingress the template crawler takes over.
        let config2 = config("", "fk", "xk", "");
        assert_eq!(
            select_provider(&site, &config2).unwrap(),
            ScrapeProvider::Fetchfox
        );
    }

    #[test]
    fn last_resort_is_any_credentialed_adapter() {
        let config = config("sk", "", "", "");
        let site = site(SiteType::Generic, None);
        assert_eq!(
            select_provider(&site, &config).unwrap(),
            ScrapeProvider::Spidercloud
        );

        let empty = config_none();
        assert!(select_provider(&site, &empty).is_err());
    }

    fn config_none() -> Config {
        Config::default()
    }
}
