use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use firecrawl_client::{BatchOptions, FirecrawlClient, FirecrawlError, ScrapeFormat, WebhookConfig};
use jobsignal_common::{now_ms, JobSignalError, ScrapeProvider, Site, SiteType, WebhookEventRow};
use jobsignal_store::ScrapeErrorRow;

use crate::events::{log_provider_dispatch, log_sync_response};
use crate::greenhouse::{extract_greenhouse_job_urls, load_greenhouse_board};
use crate::normalize::normalize_firecrawl_items;
use crate::payload::{
    build_request_snapshot, trim_scrape_payload, ScrapeItems, ScrapePayload, TrimOptions,
};
use crate::traits::FirecrawlApi;

use super::{DetailBatch, DetailScrapeResult, ListingPayload, Scraper, ScraperDeps};

pub const FIRECRAWL_CACHE_MAX_AGE_MS: u64 = 600_000;
const DETAIL_MAX_CONCURRENCY: u32 = 5;

/// Batch job kinds carried in webhook metadata.
pub const KIND_GREENHOUSE_LISTING: &str = "greenhouse_listing";
pub const KIND_SITE_CRAWL: &str = "site_crawl";

/// Webhook events per kind: single board fetches only emit the bare
/// terminal callbacks, site crawls emit the batch_scrape lifecycle.
pub fn webhook_events_for_kind(kind: &str) -> Vec<String> {
    if kind == KIND_GREENHOUSE_LISTING {
        vec!["completed".into(), "failed".into()]
    } else {
        vec![
            "batch_scrape.started".into(),
            "batch_scrape.page".into(),
            "batch_scrape.completed".into(),
            "batch_scrape.failed".into(),
        ]
    }
}

/// Structured-extraction template for job pages. The derived JSON schema
/// is handed to the provider's json format.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct JobPostingSchema {
    pub job_title: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub location: Option<String>,
    pub remote: Option<bool>,
    pub level: Option<String>,
    pub salary: Option<String>,
    pub total_compensation: Option<f64>,
    pub posted_at: Option<String>,
}

pub fn job_posting_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(JobPostingSchema)).unwrap_or_else(|_| json!({}))
}

/// Batch-async adapter. Site scrapes enqueue a webhook batch and return a
/// queued payload; the reconciler materializes results when the callback
/// lands. Listing and detail fetches run synchronously.
pub struct FirecrawlScraper {
    api: Arc<dyn FirecrawlApi>,
    deps: ScraperDeps,
}

impl FirecrawlScraper {
    pub fn new(api: Arc<dyn FirecrawlApi>, deps: ScraperDeps) -> Self {
        Self { api, deps }
    }

    fn require_key(&self) -> Result<(), JobSignalError> {
        if self.deps.config.firecrawl_api_key.is_empty() {
            return Err(JobSignalError::config(
                "FIRECRAWL_API_KEY env var is required for Firecrawl",
            ));
        }
        Ok(())
    }

    fn map_error(err: FirecrawlError) -> JobSignalError {
        match err {
            FirecrawlError::PaymentRequired(message) => JobSignalError::PaymentRequired {
                provider: "firecrawl".into(),
                message,
            },
            FirecrawlError::RateLimited(message) => JobSignalError::RateLimited {
                provider: "firecrawl".into(),
                message,
            },
            FirecrawlError::Timeout(message) => JobSignalError::Timeout {
                provider: "firecrawl".into(),
                message,
            },
            other => JobSignalError::from_provider_message("firecrawl", other.to_string()),
        }
    }

    fn kind_for_site(site: &Site) -> &'static str {
        if site.site_type == SiteType::Greenhouse {
            KIND_GREENHOUSE_LISTING
        } else {
            KIND_SITE_CRAWL
        }
    }

    /// Webhook config pointing at the store ingress. Metadata values are
    /// strings; nulls are dropped before serialization.
    pub fn build_webhook(&self, site: &Site, kind: &str) -> Result<WebhookConfig, JobSignalError> {
        let base = self.deps.config.webhook_http_base().ok_or_else(|| {
            JobSignalError::config(
                "CONVEX_HTTP_URL or CONVEX_URL env var is required for webhook scrapes",
            )
        })?;
        let mut metadata = Map::new();
        if let Some(id) = &site.id {
            metadata.insert("siteId".into(), json!(id));
        }
        metadata.insert("siteUrl".into(), json!(site.url));
        metadata.insert("siteType".into(), json!(site.site_type.as_str()));
        if let Some(pattern) = &site.pattern {
            metadata.insert("pattern".into(), json!(pattern));
        }
        metadata.insert("kind".into(), json!(kind));
        metadata.insert("providerVersion".into(), json!("v2"));
        metadata.insert("urls".into(), json!([site.url]));
        Ok(WebhookConfig {
            url: format!("{base}/api/firecrawl/webhook"),
            events: webhook_events_for_kind(kind),
            metadata,
        }
        .stringify_metadata())
    }

    /// Placeholder webhook row inserted at dispatch time so missing
    /// callbacks can be recovered later. Best-effort.
    async fn record_pending_webhook(
        &self,
        job_id: &str,
        site: &Site,
        webhook: &WebhookConfig,
        kind: &str,
        status_url: Option<String>,
    ) -> Option<String> {
        let row = WebhookEventRow {
            job_id: job_id.to_string(),
            event: "pending".into(),
            status: Some("pending".into()),
            source_url: Some(site.url.clone()),
            site_id: site.id.clone(),
            status_url,
            metadata: Some(webhook.metadata.clone()),
            payload: Some(json!({ "queuedAt": now_ms(), "kind": kind })),
            received_at: now_ms(),
            ..WebhookEventRow::default()
        };
        match self.deps.store.insert_webhook_event(row).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(job_id, error = %err, "failed to record pending webhook");
                None
            }
        }
    }

    async fn log_scrape_error(&self, source_url: &str, event: &str, error: String, metadata: Value) {
        let row = ScrapeErrorRow {
            error,
            created_at: now_ms(),
            source_url: Some(source_url.to_string()),
            event: Some(event.to_string()),
            metadata: Some(metadata),
            ..ScrapeErrorRow::default()
        };
        if let Err(err) = self.deps.store.insert_scrape_error(row).await {
            tracing::warn!(source_url, error = %err, "failed to record scrape error");
        }
    }

    fn detail_formats() -> Vec<ScrapeFormat> {
        vec![
            ScrapeFormat::markdown(),
            ScrapeFormat::json_schema(job_posting_schema()),
        ]
    }
}

#[async_trait]
impl Scraper for FirecrawlScraper {
    fn provider(&self) -> ScrapeProvider {
        ScrapeProvider::Firecrawl
    }

    /// Kick off a webhook batch and return the queued payload. Results
    /// arrive through the reconciler.
    async fn scrape_site(
        &self,
        site: &Site,
        skip_urls: Option<Vec<String>>,
    ) -> Result<ScrapePayload, JobSignalError> {
        self.require_key()?;
        let kind = Self::kind_for_site(site);
        let webhook = self.build_webhook(site, kind)?;

        let formats = if kind == KIND_GREENHOUSE_LISTING {
            vec![ScrapeFormat::json_prompt(
                "Return the full Greenhouse board JSON payload (jobs array and metadata) with no summary.",
                json!({
                    "type": "object",
                    "properties": { "jobs": { "type": "array", "items": { "type": "object" } } },
                    "required": ["jobs"],
                    "additionalProperties": true,
                }),
            )]
        } else {
            Self::detail_formats()
        };
        let options = BatchOptions {
            proxy: Some("auto".into()),
            max_age: Some(FIRECRAWL_CACHE_MAX_AGE_MS),
            store_in_cache: Some(true),
            only_main_content: (kind == KIND_SITE_CRAWL).then_some(true),
            ignore_invalid_urls: Some(true),
            ..BatchOptions::default()
        };

        log_provider_dispatch("firecrawl", &site.url, Some(kind), site.pattern.as_deref());
        let urls = vec![site.url.clone()];
        let job = match self
            .api
            .start_batch_scrape(&urls, &formats, Some(&webhook), &options)
            .await
        {
            Ok(job) => job,
            Err(err) => {
                let mapped = Self::map_error(err);
                self.log_scrape_error(
                    &site.url,
                    "start_batch_scrape",
                    mapped.to_string(),
                    json!({ "kind": kind, "pattern": site.pattern }),
                )
                .await;
                return Err(mapped);
            }
        };

        let status_url = job
            .status_url
            .clone()
            .or_else(|| Some(FirecrawlClient::status_endpoint(&job.id)));
        let webhook_id = self
            .record_pending_webhook(&job.id, site, &webhook, kind, status_url.clone())
            .await;

        let now = now_ms();
        let provider_request = json!({
            "urls": urls,
            "webhook": { "url": webhook.url, "events": webhook.events },
            "kind": kind,
            "skipUrls": skip_urls.unwrap_or_default(),
        });
        let request_snapshot = build_request_snapshot(
            provider_request.clone(),
            "firecrawl",
            "POST",
            "https://api.firecrawl.dev/v2/batch/scrape",
            Map::new(),
        );

        log_sync_response(
            "firecrawl",
            "start",
            &site.url,
            &format!("job_id={} kind={kind} queued", job.id),
        );

        Ok(ScrapePayload {
            source_url: site.url.clone(),
            pattern: site.pattern.clone(),
            started_at: now,
            completed_at: now,
            provider: Some("firecrawl".into()),
            workflow_name: Some("ScraperFirecrawlQueued".into()),
            async_state: Some("queued".into()),
            job_id: Some(job.id.clone()),
            webhook_id: webhook_id.clone(),
            metadata: Some(Value::Object(webhook.metadata.clone())),
            request: Some(request_snapshot.clone()),
            provider_request: Some(provider_request),
            async_response: Some(json!({
                "jobId": job.id,
                "statusUrl": status_url,
                "webhookId": webhook_id,
                "kind": kind,
            })),
            items: ScrapeItems {
                provider: Some("firecrawl".into()),
                queued: Some(true),
                job_id: Some(job.id),
                status_url,
                webhook_id,
                request: Some(request_snapshot),
                ..ScrapeItems::default()
            },
            ..ScrapePayload::default()
        })
    }

    async fn fetch_greenhouse_listing(
        &self,
        site: &Site,
    ) -> Result<ListingPayload, JobSignalError> {
        self.require_key()?;
        log_provider_dispatch("firecrawl", &site.url, Some("greenhouse_board"), None);
        let started_at = now_ms();
        let options = BatchOptions {
            proxy: Some("auto".into()),
            max_age: Some(FIRECRAWL_CACHE_MAX_AGE_MS),
            store_in_cache: Some(true),
            ignore_invalid_urls: Some(true),
            ..BatchOptions::default()
        };
        let urls = vec![site.url.clone()];
        let status = match self
            .api
            .batch_scrape(&urls, &[ScrapeFormat::raw_html()], &options)
            .await
        {
            Ok(status) => status,
            Err(err) => {
                let mapped = Self::map_error(err);
                self.deps.events.emit_exception(
                    "scrape.greenhouse_listing.fetch_failed",
                    &mapped.to_string(),
                    json!({ "siteUrl": site.url, "provider": "firecrawl", "siteId": site.id }),
                );
                return Err(mapped);
            }
        };

        let raw_text = status
            .first_text()
            .map(str::to_string)
            .or_else(|| {
                status
                    .first_json()
                    .and_then(|v| serde_json::to_string(v).ok())
            })
            .unwrap_or_else(|| "{}".to_string());

        let board = load_greenhouse_board(&raw_text).map_err(|err| {
            self.deps.events.emit_exception(
                "scrape.greenhouse_listing.parse_failed",
                &err.to_string(),
                json!({
                    "siteUrl": site.url,
                    "provider": "firecrawl",
                    "rawLength": raw_text.len(),
                }),
            );
            JobSignalError::Parse(format!(
                "unable to parse Greenhouse board payload (firecrawl): {err}"
            ))
        })?;
        let job_urls = extract_greenhouse_job_urls(&board, Some(&self.deps.filters));

        log_sync_response(
            "firecrawl",
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

        let options = BatchOptions {
            proxy: Some("auto".into()),
            max_age: Some(FIRECRAWL_CACHE_MAX_AGE_MS),
            store_in_cache: Some(true),
            max_concurrency: Some(DETAIL_MAX_CONCURRENCY),
            idempotency_key: batch.idempotency_key.clone(),
            ..BatchOptions::default()
        };
        log_provider_dispatch("firecrawl", &source_url, Some("greenhouse_jobs"), None);

        let status = match self
            .api
            .batch_scrape(&urls, &Self::detail_formats(), &options)
            .await
        {
            Ok(status) => status,
            Err(err) => {
                let mapped = Self::map_error(err);
                self.log_scrape_error(
                    &source_url,
                    "batch_scrape",
                    mapped.to_string(),
                    json!({ "urls": urls }),
                )
                .await;
                return Err(mapped);
            }
        };

        let raw_payload = serde_json::to_value(&status).unwrap_or(Value::Null);
        let normalized = normalize_firecrawl_items(&raw_payload, &self.deps.filters);
        let completed_at = now_ms();

        let provider_request = json!({
            "urls": urls,
            "options": {
                "formats": ["markdown", "json"],
                "proxy": "auto",
                "maxAge": FIRECRAWL_CACHE_MAX_AGE_MS,
                "maxConcurrency": DETAIL_MAX_CONCURRENCY,
            },
            "idempotencyKey": batch.idempotency_key,
            "sourceUrl": source_url,
        });
        let request_snapshot = build_request_snapshot(
            provider_request.clone(),
            "firecrawl",
            "POST",
            "https://api.firecrawl.dev/v2/batch/scrape",
            Map::new(),
        );

        let payload = ScrapePayload {
            source_url: source_url.clone(),
            pattern: batch.pattern.clone(),
            started_at: now_ms(),
            completed_at,
            provider: Some("firecrawl".into()),
            request: Some(request_snapshot.clone()),
            provider_request: Some(provider_request),
            items: ScrapeItems {
                normalized,
                raw: Some(raw_payload),
                provider: Some("firecrawl".into()),
                seed_urls: urls.clone(),
                request: Some(request_snapshot),
                ..ScrapeItems::default()
            },
            ..ScrapePayload::default()
        };
        let (trimmed, _) = trim_scrape_payload(&payload, &TrimOptions::default());
        let jobs_scraped = trimmed.items.normalized.len();
        log_sync_response(
            "firecrawl",
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
