pub mod error;
pub mod http;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use error::{Result, StoreError};
pub use http::HttpStore;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use jobsignal_common::{
    HeuristicConfig, IgnoredJob, JobInput, PendingJobDetail, QueueStatus, QueuedUrl,
    ScrapeProvider, Site, WebhookEventRow,
};

/// Remote operation names, verbatim. Every store call goes through one of
/// these; the HTTP implementation posts them as the function path.
pub mod op {
    pub const LIST_SITES: &str = "router:listSites";
    pub const LEASE_SITE: &str = "router:leaseSite";
    pub const COMPLETE_SITE: &str = "router:completeSite";
    pub const FAIL_SITE: &str = "router:failSite";
    pub const LIST_SEEN_JOB_URLS_FOR_SITE: &str = "router:listSeenJobUrlsForSite";
    pub const FIND_EXISTING_JOB_URLS: &str = "router:findExistingJobUrls";
    pub const ENQUEUE_SCRAPE_URLS: &str = "router:enqueueScrapeUrls";
    pub const LEASE_SCRAPE_URL_BATCH: &str = "router:leaseScrapeUrlBatch";
    pub const COMPLETE_SCRAPE_URLS: &str = "router:completeScrapeUrls";
    pub const LIST_QUEUED_SCRAPE_URLS: &str = "router:listQueuedScrapeUrls";
    pub const INSERT_SCRAPE_RECORD: &str = "router:insertScrapeRecord";
    pub const INGEST_JOBS_FROM_SCRAPE: &str = "router:ingestJobsFromScrape";
    pub const INSERT_IGNORED_JOB: &str = "router:insertIgnoredJob";
    pub const INSERT_SCRAPE_ERROR: &str = "router:insertScrapeError";
    pub const INSERT_FIRECRAWL_WEBHOOK_EVENT: &str = "router:insertFirecrawlWebhookEvent";
    pub const LIST_PENDING_FIRECRAWL_WEBHOOKS: &str = "router:listPendingFirecrawlWebhooks";
    pub const GET_FIRECRAWL_WEBHOOK_STATUS: &str = "router:getFirecrawlWebhookStatus";
    pub const MARK_FIRECRAWL_WEBHOOK_PROCESSED: &str = "router:markFirecrawlWebhookProcessed";
    pub const LIST_PENDING_JOB_DETAILS: &str = "router:listPendingJobDetails";
    pub const COUNT_PENDING_JOB_DETAILS: &str = "router:countPendingJobDetails";
    pub const LIST_JOB_DETAIL_CONFIGS: &str = "router:listJobDetailConfigs";
    pub const RECORD_JOB_DETAIL_HEURISTIC: &str = "router:recordJobDetailHeuristic";
    pub const UPDATE_JOB_WITH_HEURISTIC: &str = "router:updateJobWithHeuristic";
    pub const RECORD_WORKFLOW_RUN: &str = "temporal:recordWorkflowRun";
}

/// Arguments for `router:leaseSite`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseSiteArgs {
    pub worker_id: String,
    pub lock_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_provider: Option<ScrapeProvider>,
}

impl LeaseSiteArgs {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            lock_seconds: 300,
            site_type: None,
            scrape_provider: None,
        }
    }
}

/// Arguments for `router:enqueueScrapeUrls`. Optional fields are omitted
/// from the wire payload rather than sent as nulls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueScrapeUrls {
    pub urls: Vec<String>,
    pub source_url: String,
    pub provider: ScrapeProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Result of an enqueue: the subset of URLs actually queued.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueResult {
    #[serde(default)]
    pub queued: Vec<String>,
}

/// Arguments for `router:leaseScrapeUrlBatch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseScrapeUrlBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ScrapeProvider>,
    pub limit: usize,
    pub processing_expiry_ms: i64,
    pub max_per_minute_default: usize,
}

/// Arguments for `router:completeScrapeUrls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteScrapeUrls {
    pub urls: Vec<String>,
    pub status: QueueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompleteScrapeUrls {
    pub fn completed(urls: Vec<String>) -> Self {
        Self {
            urls,
            status: QueueStatus::Completed,
            error: None,
        }
    }

    pub fn failed(urls: Vec<String>, error: impl Into<String>) -> Self {
        Self {
            urls,
            status: QueueStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Arguments for `router:listQueuedScrapeUrls` (limit caps at 500
/// server-side).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQueuedScrapeUrls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ScrapeProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<QueueStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    pub limit: usize,
}

/// Row for the append-only scrape-error log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeErrorRow {
    pub error: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// The named-operation store surface used by the pipeline. One method per
/// remote operation; implementations must keep the record-level atomicity
/// the queue and site leases rely on.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Sites ---
    async fn list_sites(&self, enabled_only: bool) -> Result<Vec<Site>>;
    async fn lease_site(&self, args: LeaseSiteArgs) -> Result<Option<Site>>;
    async fn complete_site(&self, id: &str) -> Result<()>;
    async fn fail_site(&self, id: &str, error: Option<String>) -> Result<()>;

    // --- Dedup / seen URLs ---
    async fn list_seen_job_urls_for_site(
        &self,
        source_url: &str,
        pattern: Option<&str>,
    ) -> Result<Vec<String>>;
    async fn find_existing_job_urls(&self, urls: &[String]) -> Result<Vec<String>>;

    // --- URL queue ---
    async fn enqueue_scrape_urls(&self, args: EnqueueScrapeUrls) -> Result<EnqueueResult>;
    async fn lease_scrape_url_batch(&self, args: LeaseScrapeUrlBatch) -> Result<Vec<QueuedUrl>>;
    async fn complete_scrape_urls(&self, args: CompleteScrapeUrls) -> Result<u32>;
    async fn list_queued_scrape_urls(&self, args: ListQueuedScrapeUrls) -> Result<Vec<QueuedUrl>>;

    // --- Scrapes and jobs ---
    async fn insert_scrape_record(&self, record: Value) -> Result<String>;
    async fn ingest_jobs_from_scrape(
        &self,
        jobs: Vec<JobInput>,
        site_id: Option<String>,
    ) -> Result<()>;
    async fn insert_ignored_job(&self, job: IgnoredJob) -> Result<()>;
    async fn insert_scrape_error(&self, row: ScrapeErrorRow) -> Result<()>;

    // --- Webhooks ---
    async fn insert_webhook_event(&self, row: WebhookEventRow) -> Result<Option<String>>;
    async fn list_pending_webhooks(
        &self,
        limit: usize,
        event: Option<&str>,
    ) -> Result<Vec<WebhookEventRow>>;
    async fn get_webhook_status(&self, job_id: &str) -> Result<Option<Value>>;
    async fn mark_webhook_processed(&self, id: &str, error: Option<String>) -> Result<()>;

    // --- Heuristic enrichment ---
    async fn list_pending_job_details(&self, limit: usize) -> Result<Vec<PendingJobDetail>>;
    async fn count_pending_job_details(&self) -> Result<Option<u64>>;
    async fn list_job_detail_configs(&self, domain: &str) -> Result<Vec<HeuristicConfig>>;
    async fn record_job_detail_heuristic(&self, config: HeuristicConfig) -> Result<()>;
    async fn update_job_with_heuristic(&self, id: &str, patch: Value) -> Result<()>;

    // --- Run bookkeeping ---
    async fn record_workflow_run(&self, run: Value) -> Result<()>;
}
