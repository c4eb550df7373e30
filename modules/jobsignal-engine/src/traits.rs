//! Trait seams over the provider clients. Adapters depend on these
//! instead of the concrete clients so scrape flows run deterministically
//! in tests: no network, no keys, no sleeping.

use async_trait::async_trait;
use serde_json::Value;

use fetchfox_client::{CrawlRequest, FetchFoxClient, FetchFoxError, ScrapeRequest};
use firecrawl_client::{
    BatchJob, BatchOptions, BatchStatus, FirecrawlClient, FirecrawlError, ScrapeFormat,
    WebhookConfig,
};
use spidercloud_client::{ScrapeParams, SpiderClient, SpiderCloudError, SpiderEvent};

#[async_trait]
pub trait SpiderApi: Send + Sync {
    async fn scrape_url(
        &self,
        url: &str,
        params: &ScrapeParams,
    ) -> Result<Vec<SpiderEvent>, SpiderCloudError>;
}

#[async_trait]
impl SpiderApi for SpiderClient {
    async fn scrape_url(
        &self,
        url: &str,
        params: &ScrapeParams,
    ) -> Result<Vec<SpiderEvent>, SpiderCloudError> {
        SpiderClient::scrape_url(self, url, params).await
    }
}

#[async_trait]
pub trait FirecrawlApi: Send + Sync {
    async fn start_batch_scrape(
        &self,
        urls: &[String],
        formats: &[ScrapeFormat],
        webhook: Option<&WebhookConfig>,
        options: &BatchOptions,
    ) -> Result<BatchJob, FirecrawlError>;

    async fn batch_scrape(
        &self,
        urls: &[String],
        formats: &[ScrapeFormat],
        options: &BatchOptions,
    ) -> Result<BatchStatus, FirecrawlError>;

    async fn get_batch_scrape_status(&self, job_id: &str) -> Result<BatchStatus, FirecrawlError>;
}

#[async_trait]
impl FirecrawlApi for FirecrawlClient {
    async fn start_batch_scrape(
        &self,
        urls: &[String],
        formats: &[ScrapeFormat],
        webhook: Option<&WebhookConfig>,
        options: &BatchOptions,
    ) -> Result<BatchJob, FirecrawlError> {
        FirecrawlClient::start_batch_scrape(self, urls, formats, webhook, options).await
    }

    async fn batch_scrape(
        &self,
        urls: &[String],
        formats: &[ScrapeFormat],
        options: &BatchOptions,
    ) -> Result<BatchStatus, FirecrawlError> {
        FirecrawlClient::batch_scrape(self, urls, formats, options).await
    }

    async fn get_batch_scrape_status(&self, job_id: &str) -> Result<BatchStatus, FirecrawlError> {
        FirecrawlClient::get_batch_scrape_status(self, job_id).await
    }
}

#[async_trait]
pub trait FetchFoxApi: Send + Sync {
    async fn scrape(&self, request: &ScrapeRequest) -> Result<Value, FetchFoxError>;
    async fn crawl(&self, request: &CrawlRequest) -> Result<Value, FetchFoxError>;
}

#[async_trait]
impl FetchFoxApi for FetchFoxClient {
    async fn scrape(&self, request: &ScrapeRequest) -> Result<Value, FetchFoxError> {
        FetchFoxClient::scrape(self, request).await
    }

    async fn crawl(&self, request: &CrawlRequest) -> Result<Value, FetchFoxError> {
        FetchFoxClient::crawl(self, request).await
    }
}

/// Plain HTTPS GET used for Greenhouse board JSON endpoints.
#[async_trait]
pub trait ListingFetcher: Send + Sync {
    async fn get_text(&self, url: &str) -> anyhow::Result<String>;
}

#[async_trait]
impl ListingFetcher for reqwest::Client {
    async fn get_text(&self, url: &str) -> anyhow::Result<String> {
        let resp = self.get(url).send().await?;
        let resp = resp.error_for_status()?;
        Ok(resp.text().await?)
    }
}
