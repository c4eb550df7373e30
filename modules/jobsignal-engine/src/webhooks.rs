//! Webhook reconciliation for the batch-async provider: correlates
//! callbacks to outstanding jobs, fetches results, and enforces the
//! terminal deadline beyond which a job is cancelled-expired.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};

use firecrawl_client::FirecrawlError;
use jobsignal_common::{
    now_ms, FilterSettings, JobSignalError, QueueStatus, ScrapeProvider, WebhookEventRow,
};
use jobsignal_store::{ScrapeErrorRow, Store};

use crate::greenhouse::load_greenhouse_board;
use crate::normalize::normalize_firecrawl_items;
use crate::payload::{ScrapeItems, ScrapePayload};
use crate::queue::enqueue_new_urls;
use crate::scrapers::{KIND_GREENHOUSE_LISTING, KIND_SITE_CRAWL};
use crate::storing::StorageAdapter;
use crate::traits::FirecrawlApi;

pub const STATUS_EXPIRATION_MS: i64 = 24 * 60 * 60 * 1000;
pub const STATUS_WARN_MS: i64 = 23 * 60 * 60 * 1000;

/// What the age of a job allows the reconciler to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryDecision {
    /// Fresh enough to fetch status normally.
    Fetch,
    /// Past the warn threshold: fetch, but a 404/"no such method" means
    /// the job is gone and is treated as cancelled-expired.
    FetchLenient,
    /// Past the terminal deadline: no status call at all.
    Expired,
}

pub fn expiry_decision(age_ms: i64) -> ExpiryDecision {
    if age_ms >= STATUS_EXPIRATION_MS {
        ExpiryDecision::Expired
    } else if age_ms >= STATUS_WARN_MS {
        ExpiryDecision::FetchLenient
    } else {
        ExpiryDecision::Fetch
    }
}

/// Outcome of collecting one job's result.
#[derive(Debug)]
pub enum CollectOutcome {
    CancelledExpired { error: String },
    Failed { error: String },
    Listing { job_urls: Vec<String> },
    Crawl { scrape: Box<ScrapePayload>, jobs_scraped: usize },
}

pub struct WebhookReconciler {
    api: Arc<dyn FirecrawlApi>,
    store: Arc<dyn Store>,
    filters: Arc<FilterSettings>,
}

impl WebhookReconciler {
    pub fn new(
        api: Arc<dyn FirecrawlApi>,
        store: Arc<dyn Store>,
        filters: Arc<FilterSettings>,
    ) -> Self {
        Self { api, store, filters }
    }

    fn metadata_str(row: &WebhookEventRow, key: &str) -> Option<String> {
        row.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn first_seen_ms(row: &WebhookEventRow) -> i64 {
        let candidates = [
            Self::metadata_str(row, "queuedAt").and_then(|v| v.parse().ok()),
            Self::metadata_str(row, "createdAt").and_then(|v| v.parse().ok()),
            row.payload
                .as_ref()
                .and_then(|p| p.get("queuedAt"))
                .and_then(Value::as_i64),
            Some(row.received_at),
        ];
        candidates.into_iter().flatten().next().unwrap_or_else(now_ms)
    }

    async fn record_error(&self, row: &WebhookEventRow, error: &str) {
        let record = ScrapeErrorRow {
            error: error.to_string(),
            created_at: now_ms(),
            job_id: Some(row.job_id.clone()),
            source_url: row
                .source_url
                .clone()
                .or_else(|| Self::metadata_str(row, "siteUrl")),
            site_id: row.site_id.clone(),
            event: Some(row.event.clone()),
            status: row.status.clone(),
            metadata: row.metadata.clone().map(Value::Object),
            payload: row.payload.clone(),
        };
        if let Err(err) = self.store.insert_scrape_error(record).await {
            tracing::warn!(job_id = %row.job_id, error = %err, "insertScrapeError failed");
        }
    }

    /// Fetch a job's results and shape them for downstream storage. The
    /// 23 h/24 h expiry ladder is enforced here.
    pub async fn collect_job_result(
        &self,
        row: &WebhookEventRow,
    ) -> Result<CollectOutcome, JobSignalError> {
        let job_id = row.job_id.clone();
        if job_id.is_empty() {
            return Err(JobSignalError::Validation(
                "webhook payload missing jobId".into(),
            ));
        }
        let kind = Self::metadata_str(row, "kind").unwrap_or_else(|| KIND_SITE_CRAWL.to_string());
        let source_url = row
            .source_url
            .clone()
            .or_else(|| Self::metadata_str(row, "siteUrl"))
            .unwrap_or_default();
        let pattern = Self::metadata_str(row, "pattern");
        let age_ms = (now_ms() - Self::first_seen_ms(row)).max(0);
        let decision = expiry_decision(age_ms);

        tracing::info!(job_id = %job_id, kind = %kind, source_url = %source_url, age_ms, ?decision, "collect webhook job result");

        if decision == ExpiryDecision::Expired {
            let msg = format!(
                "batch job expired (>24h); skipping status lookup (job_id={job_id}, age_ms={age_ms})"
            );
            tracing::warn!(job_id = %job_id, age_ms, "webhook job expired");
            self.record_error(row, &msg).await;
            return Ok(CollectOutcome::CancelledExpired { error: msg });
        }

        if row.event == "failed" || row.event == "batch_scrape.failed" {
            let error = row
                .error
                .clone()
                .unwrap_or_else(|| format!("provider reported {} for job {job_id}", row.event));
            self.record_error(row, &error).await;
            return Ok(CollectOutcome::Failed { error });
        }

        let status = match self.api.get_batch_scrape_status(&job_id).await {
            Ok(status) => status,
            Err(err) => {
                let message = err.to_string();
                self.record_error(row, &message).await;
                let lower = message.to_lowercase();
                let missing = matches!(&err, FirecrawlError::Api { status: 404, .. })
                    || lower.contains("no such method")
                    || lower.contains("no attribute");
                if missing && decision == ExpiryDecision::FetchLenient {
                    let msg = format!(
                        "batch job failed to complete within 24h; treating as cancelled (job_id={job_id}, age_ms={age_ms})"
                    );
                    return Ok(CollectOutcome::CancelledExpired { error: msg });
                }
                if lower.contains("invalid job id") {
                    return Ok(CollectOutcome::Failed { error: message });
                }
                return Err(match err {
                    FirecrawlError::RateLimited(m) => JobSignalError::RateLimited {
                        provider: "firecrawl".into(),
                        message: m,
                    },
                    FirecrawlError::Timeout(m) => JobSignalError::Timeout {
                        provider: "firecrawl".into(),
                        message: m,
                    },
                    other => JobSignalError::from_provider_message("firecrawl", other.to_string()),
                });
            }
        };

        if kind == KIND_GREENHOUSE_LISTING {
            let raw_text = status
                .first_text()
                .map(str::to_string)
                .or_else(|| {
                    status
                        .first_json()
                        .and_then(|v| serde_json::to_string(v).ok())
                })
                .unwrap_or_else(|| "{}".into());
            let board = load_greenhouse_board(&raw_text).map_err(|err| {
                JobSignalError::Parse(format!(
                    "unable to parse Greenhouse board payload (webhook): {err}"
                ))
            })?;
            // The webhook path extracts every URL; keyword filtering
            // happens when details are normalized.
            let job_urls = crate::greenhouse::extract_greenhouse_job_urls(&board, None);
            return Ok(CollectOutcome::Listing { job_urls });
        }

        let raw_payload = serde_json::to_value(&status).unwrap_or(Value::Null);
        let normalized = normalize_firecrawl_items(&raw_payload, &self.filters);
        let jobs_scraped = normalized.len();
        let now = now_ms();
        let scrape = ScrapePayload {
            source_url: source_url.clone(),
            pattern,
            started_at: Self::first_seen_ms(row),
            completed_at: now,
            provider: Some("firecrawl".into()),
            workflow_name: Some("ProcessWebhookScrape".into()),
            site_id: row.site_id.clone(),
            job_id: Some(job_id),
            items: ScrapeItems {
                normalized,
                raw: Some(raw_payload),
                provider: Some("firecrawl".into()),
                ..ScrapeItems::default()
            },
            ..ScrapePayload::default()
        };
        Ok(CollectOutcome::Crawl {
            scrape: Box::new(scrape),
            jobs_scraped,
        })
    }

    /// Periodic sweep. Terminal callbacks are processed immediately;
    /// pending placeholders are only retried once they pass the warn
    /// threshold, and past the deadline they are closed out as
    /// cancelled-expired. Returns the number of rows marked processed.
    pub async fn process_pending(
        &self,
        storage: &StorageAdapter,
        limit: usize,
    ) -> Result<usize> {
        let pending = self.store.list_pending_webhooks(limit, None).await?;
        let mut processed = 0usize;

        for row in pending {
            let Some(row_id) = row.id.clone() else {
                continue;
            };
            let age_ms = (now_ms() - Self::first_seen_ms(&row)).max(0);
            if row.event == "pending" && expiry_decision(age_ms) == ExpiryDecision::Fetch {
                // Still waiting on the callback.
                continue;
            }

            let outcome = match self.collect_job_result(&row).await {
                Ok(outcome) => outcome,
                Err(err) if err.is_retryable() => {
                    tracing::info!(job_id = %row.job_id, error = %err, "webhook status transient failure; will retry");
                    continue;
                }
                Err(err) => {
                    self.mark_processed(&row_id, Some(err.to_string())).await;
                    processed += 1;
                    continue;
                }
            };

            match outcome {
                CollectOutcome::CancelledExpired { error }
                | CollectOutcome::Failed { error } => {
                    self.mark_processed(&row_id, Some(error)).await;
                    // Any URLs this batch was holding are released.
                    if let Some(source_url) = &row.source_url {
                        let _ = self
                            .store
                            .complete_scrape_urls(jobsignal_store::CompleteScrapeUrls {
                                urls: vec![source_url.clone()],
                                status: QueueStatus::Failed,
                                error: Some("webhook terminal failure".into()),
                            })
                            .await;
                    }
                    processed += 1;
                }
                CollectOutcome::Listing { job_urls } => {
                    let source_url = row
                        .source_url
                        .clone()
                        .or_else(|| Self::metadata_str(&row, "siteUrl"))
                        .unwrap_or_default();
                    if !job_urls.is_empty() && !source_url.is_empty() {
                        let site_id = row
                            .site_id
                            .clone()
                            .filter(|id| jobsignal_common::looks_like_store_id(id));
                        if let Err(err) = enqueue_new_urls(
                            &self.store,
                            job_urls,
                            &source_url,
                            ScrapeProvider::Spidercloud,
                            site_id,
                            Self::metadata_str(&row, "pattern"),
                        )
                        .await
                        {
                            tracing::warn!(error = %err, "failed to enqueue listing URLs from webhook");
                        }
                    }
                    self.mark_processed(&row_id, None).await;
                    processed += 1;
                }
                CollectOutcome::Crawl { scrape, jobs_scraped } => {
                    if let Err(err) = storage.store_scrape(&scrape).await {
                        tracing::warn!(error = %err, "failed to store webhook scrape");
                    }
                    tracing::info!(job_id = %row.job_id, jobs_scraped, "webhook scrape stored");
                    self.mark_processed(&row_id, None).await;
                    processed += 1;
                }
            }
        }
        Ok(processed)
    }

    async fn mark_processed(&self, id: &str, error: Option<String>) {
        if let Err(err) = self.store.mark_webhook_processed(id, error).await {
            tracing::warn!(webhook_id = id, error = %err, "markWebhookProcessed failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TracingSink;
    use crate::testing::MockFirecrawl;
    use jobsignal_common::RemoteCompanies;
    use jobsignal_store::MemoryStore;
    use serde_json::Map;

    fn reconciler_with(
        memory: &Arc<MemoryStore>,
        api: MockFirecrawl,
    ) -> (WebhookReconciler, StorageAdapter) {
        let store: Arc<dyn Store> = memory.clone();
        let filters = Arc::new(FilterSettings::default());
        (
            WebhookReconciler::new(Arc::new(api), store.clone(), filters.clone()),
            StorageAdapter::new(
                memory.clone(),
                filters,
                Arc::new(RemoteCompanies::default()),
                Arc::new(TracingSink),
            ),
        )
    }

    fn metadata(kind: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("kind".into(), json!(kind));
        map.insert("siteUrl".into(), json!("https://example.com/jobs"));
        map
    }

    fn row(event: &str, age_ms: i64, kind: &str) -> WebhookEventRow {
        WebhookEventRow {
            job_id: "job-1".into(),
            event: event.into(),
            source_url: Some("https://example.com/jobs".into()),
            metadata: Some(metadata(kind)),
            received_at: now_ms() - age_ms,
            ..WebhookEventRow::default()
        }
    }

    #[test]
    fn expiry_ladder_thresholds() {
        assert_eq!(expiry_decision(0), ExpiryDecision::Fetch);
        assert_eq!(
            expiry_decision(STATUS_WARN_MS - 1),
            ExpiryDecision::Fetch
        );
        assert_eq!(
            expiry_decision(STATUS_WARN_MS + 1),
            ExpiryDecision::FetchLenient
        );
        assert_eq!(
            expiry_decision(STATUS_EXPIRATION_MS),
            ExpiryDecision::Expired
        );
    }

    #[tokio::test]
    async fn jobs_older_than_24h_cancel_without_status_fetch() {
        let memory = Arc::new(MemoryStore::new());
        let (reconciler, _) = reconciler_with(
            &memory,
            MockFirecrawl::failing(FirecrawlError::Api {
                status: 500,
                message: "status should never be called".into(),
            }),
        );
        let outcome = reconciler
            .collect_job_result(&row("pending", STATUS_EXPIRATION_MS + 1_000, KIND_SITE_CRAWL))
            .await
            .unwrap();
        assert!(matches!(outcome, CollectOutcome::CancelledExpired { .. }));
        assert_eq!(memory.scrape_errors().len(), 1);
    }

    #[tokio::test]
    async fn late_404s_become_cancelled_expired() {
        let memory = Arc::new(MemoryStore::new());
        let (reconciler, _) = reconciler_with(
            &memory,
            MockFirecrawl::failing(FirecrawlError::Api {
                status: 404,
                message: "not found".into(),
            }),
        );
        let outcome = reconciler
            .collect_job_result(&row("pending", STATUS_WARN_MS + 60_000, KIND_SITE_CRAWL))
            .await
            .unwrap();
        assert!(matches!(outcome, CollectOutcome::CancelledExpired { .. }));

        // A fresh 404 is a plain provider failure, not an expiry.
        let (reconciler, _) = reconciler_with(
            &memory,
            MockFirecrawl::failing(FirecrawlError::Api {
                status: 404,
                message: "not found".into(),
            }),
        );
        let err = reconciler
            .collect_job_result(&row("completed", 10_000, KIND_SITE_CRAWL))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn listing_results_enqueue_detail_urls() {
        let memory = Arc::new(MemoryStore::new());
        let board = json!({
            "raw_html": r#"{"jobs": [
                {"absolute_url": "https://boards.greenhouse.io/acme/jobs/1", "id": 1, "title": "Software Engineer"},
                {"absolute_url": "https://boards.greenhouse.io/acme/jobs/2", "id": 2, "title": "Recruiter"}
            ]}"#
        });
        let (reconciler, storage) =
            reconciler_with(&memory, MockFirecrawl::with_documents(vec![board]));
        memory
            .insert_webhook_event(row("completed", 10_000, KIND_GREENHOUSE_LISTING))
            .await
            .unwrap();

        let processed = reconciler.process_pending(&storage, 10).await.unwrap();
        assert_eq!(processed, 1);
        // Webhook-path listings keep every URL; filtering happens later.
        assert_eq!(memory.queue_rows().len(), 2);
        assert!(memory.webhooks()[0].processed_at.is_some());
    }

    #[tokio::test]
    async fn crawl_results_are_stored_and_marked_processed() {
        let memory = Arc::new(MemoryStore::new());
        let doc = json!({
            "json": {
                "job_title": "Senior Software Engineer",
                "url": "https://example.com/job/1",
                "description": "Build things in Austin, TX",
            }
        });
        let (reconciler, storage) =
            reconciler_with(&memory, MockFirecrawl::with_documents(vec![doc]));
        memory
            .insert_webhook_event(row("batch_scrape.completed", 10_000, KIND_SITE_CRAWL))
            .await
            .unwrap();

        let processed = reconciler.process_pending(&storage, 10).await.unwrap();
        assert_eq!(processed, 1);
        assert_eq!(memory.scrapes().len(), 1);
        assert_eq!(memory.jobs().len(), 1);
    }

    #[tokio::test]
    async fn fresh_pending_placeholders_are_left_alone() {
        let memory = Arc::new(MemoryStore::new());
        let (reconciler, storage) = reconciler_with(&memory, MockFirecrawl::default());
        memory
            .insert_webhook_event(row("pending", 1_000, KIND_SITE_CRAWL))
            .await
            .unwrap();
        let processed = reconciler.process_pending(&storage, 10).await.unwrap();
        assert_eq!(processed, 0);
        assert!(memory.webhooks()[0].processed_at.is_none());
    }
}
