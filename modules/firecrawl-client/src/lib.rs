pub mod error;
pub mod types;

pub use error::{FirecrawlError, Result};
pub use types::{BatchJob, BatchOptions, BatchStatus, Document, ScrapeFormat, WebhookConfig};

use serde_json::{Map, Value};
use std::time::Duration;

const BASE_URL: &str = "https://api.firecrawl.dev/v2";

/// Client for the Firecrawl batch-scrape API. Batches either complete
/// asynchronously through a webhook (`start_batch_scrape`) or are polled
/// to completion in-process (`batch_scrape`).
pub struct FirecrawlClient {
    client: reqwest::Client,
    api_key: String,
}

impl FirecrawlClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    pub fn status_endpoint(job_id: &str) -> String {
        format!("{BASE_URL}/batch/scrape/{job_id}")
    }

    /// Start a batch scrape without waiting for results. The returned job
    /// id correlates the webhook callbacks.
    pub async fn start_batch_scrape(
        &self,
        urls: &[String],
        formats: &[ScrapeFormat],
        webhook: Option<&WebhookConfig>,
        options: &BatchOptions,
    ) -> Result<BatchJob> {
        let body = build_batch_body(urls, formats, webhook, options)?;
        let resp = self
            .client
            .post(format!("{BASE_URL}/batch/scrape"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FirecrawlError::from_status(status.as_u16(), message));
        }

        let job: BatchJob = resp.json().await?;
        tracing::info!(job_id = %job.id, urls = urls.len(), "Firecrawl batch started");
        Ok(job)
    }

    /// Start a batch and poll until it reaches a terminal status. Used
    /// for synchronous listing/detail fetches that don't go through the
    /// webhook path.
    pub async fn batch_scrape(
        &self,
        urls: &[String],
        formats: &[ScrapeFormat],
        options: &BatchOptions,
    ) -> Result<BatchStatus> {
        let job = self.start_batch_scrape(urls, formats, None, options).await?;
        loop {
            let status = self.get_batch_scrape_status(&job.id).await?;
            match status.status.as_deref() {
                Some("completed") => return Ok(status),
                Some("failed") | Some("cancelled") => {
                    return Err(FirecrawlError::Api {
                        status: 0,
                        message: format!(
                            "batch {} ended with status {}",
                            job.id,
                            status.status.as_deref().unwrap_or("unknown")
                        ),
                    });
                }
                other => {
                    tracing::debug!(job_id = %job.id, status = ?other, "Batch still in progress");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    /// Fetch the batch status with all scraped documents.
    pub async fn get_batch_scrape_status(&self, job_id: &str) -> Result<BatchStatus> {
        let resp = self
            .client
            .get(Self::status_endpoint(job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FirecrawlError::from_status(status.as_u16(), message));
        }

        Ok(resp.json().await?)
    }
}

fn build_batch_body(
    urls: &[String],
    formats: &[ScrapeFormat],
    webhook: Option<&WebhookConfig>,
    options: &BatchOptions,
) -> Result<Value> {
    let mut body = Map::new();
    body.insert("urls".into(), serde_json::to_value(urls)?);
    body.insert("formats".into(), serde_json::to_value(formats)?);
    if let Some(webhook) = webhook {
        body.insert(
            "webhook".into(),
            serde_json::to_value(webhook.clone().stringify_metadata())?,
        );
    }
    if let Value::Object(opts) = serde_json::to_value(options)? {
        for (key, value) in opts {
            body.insert(key, value);
        }
    }
    Ok(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_body_carries_webhook_and_options() {
        let webhook = WebhookConfig {
            url: "https://x.convex.site/api/firecrawl/webhook".into(),
            events: vec!["completed".into(), "failed".into()],
            metadata: Map::new(),
        };
        let options = BatchOptions {
            proxy: Some("auto".into()),
            max_age: Some(600_000),
            store_in_cache: Some(true),
            ..BatchOptions::default()
        };
        let body = build_batch_body(
            &["https://example.com".into()],
            &[ScrapeFormat::raw_html()],
            Some(&webhook),
            &options,
        )
        .unwrap();
        assert_eq!(body["urls"][0], "https://example.com");
        assert_eq!(body["formats"][0], json!("rawHtml"));
        assert_eq!(body["webhook"]["events"][1], "failed");
        assert_eq!(body["proxy"], "auto");
        assert_eq!(body["max_age"], 600_000);
    }

    #[test]
    fn status_endpoint_embeds_job_id() {
        assert_eq!(
            FirecrawlClient::status_endpoint("abc-123"),
            "https://api.firecrawl.dev/v2/batch/scrape/abc-123"
        );
    }
}
