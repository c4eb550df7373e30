use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use jobsignal_common::{
    now_ms, HeuristicConfig, IgnoredJob, JobInput, PendingJobDetail, QueueStatus, QueuedUrl,
    ScrapeProvider, Site, WebhookEventRow,
};

use crate::error::{Result, StoreError};
use crate::{
    CompleteScrapeUrls, EnqueueResult, EnqueueScrapeUrls, LeaseScrapeUrlBatch, LeaseSiteArgs,
    ListQueuedScrapeUrls, ScrapeErrorRow, Store,
};

const QUEUE_TTL_MS: i64 = 48 * 60 * 60 * 1000;
const MAX_RECORD_BYTES: usize = 8 * 1024 * 1024;
const LIST_LIMIT_CAP: usize = 500;

#[derive(Default)]
struct Inner {
    sites: Vec<Site>,
    queue: HashMap<(ScrapeProvider, String), QueuedUrl>,
    jobs: HashMap<String, JobInput>,
    seen: HashMap<String, HashSet<String>>,
    scrapes: Vec<Value>,
    ignored: Vec<IgnoredJob>,
    errors: Vec<ScrapeErrorRow>,
    webhooks: Vec<WebhookEventRow>,
    pending_details: Vec<PendingJobDetail>,
    heuristic_configs: Vec<HeuristicConfig>,
    heuristic_patches: HashMap<String, Vec<Value>>,
    workflow_runs: Vec<Value>,
    next_id: u64,
}

impl Inner {
    fn make_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        // Shape matters: engine code treats short / non-alphanumeric ids as
        // non-store-managed.
        format!("{prefix}{:027}", self.next_id)
    }
}

/// In-memory store honoring the queue and lease invariants, used by tests
/// and local tooling in place of the remote deployment.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Seeding & inspection helpers ---

    pub fn seed_site(&self, mut site: Site) -> String {
        let mut inner = self.inner.lock().unwrap();
        let id = site
            .id
            .clone()
            .unwrap_or_else(|| inner.make_id("site"));
        site.id = Some(id.clone());
        inner.sites.push(site);
        id
    }

    pub fn seed_seen_urls(&self, source_url: &str, urls: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.seen.entry(source_url.to_string()).or_default();
        for url in urls {
            entry.insert(url.to_string());
        }
    }

    pub fn seed_job(&self, job: JobInput) {
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.insert(job.url.clone(), job);
    }

    pub fn seed_queue_row(&self, row: QueuedUrl) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.insert((row.provider, row.url.clone()), row);
    }

    pub fn seed_pending_detail(&self, detail: PendingJobDetail) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending_details.push(detail);
    }

    pub fn sites(&self) -> Vec<Site> {
        self.inner.lock().unwrap().sites.clone()
    }

    pub fn queue_rows(&self) -> Vec<QueuedUrl> {
        self.inner.lock().unwrap().queue.values().cloned().collect()
    }

    pub fn queue_row(&self, provider: ScrapeProvider, url: &str) -> Option<QueuedUrl> {
        self.inner
            .lock()
            .unwrap()
            .queue
            .get(&(provider, url.to_string()))
            .cloned()
    }

    pub fn jobs(&self) -> Vec<JobInput> {
        self.inner.lock().unwrap().jobs.values().cloned().collect()
    }

    pub fn job(&self, url: &str) -> Option<JobInput> {
        self.inner.lock().unwrap().jobs.get(url).cloned()
    }

    pub fn scrapes(&self) -> Vec<Value> {
        self.inner.lock().unwrap().scrapes.clone()
    }

    pub fn ignored_jobs(&self) -> Vec<IgnoredJob> {
        self.inner.lock().unwrap().ignored.clone()
    }

    pub fn scrape_errors(&self) -> Vec<ScrapeErrorRow> {
        self.inner.lock().unwrap().errors.clone()
    }

    pub fn webhooks(&self) -> Vec<WebhookEventRow> {
        self.inner.lock().unwrap().webhooks.clone()
    }

    pub fn heuristic_configs(&self) -> Vec<HeuristicConfig> {
        self.inner.lock().unwrap().heuristic_configs.clone()
    }

    pub fn heuristic_patches(&self, id: &str) -> Vec<Value> {
        self.inner
            .lock()
            .unwrap()
            .heuristic_patches
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn workflow_runs(&self) -> Vec<Value> {
        self.inner.lock().unwrap().workflow_runs.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_sites(&self, enabled_only: bool) -> Result<Vec<Site>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sites
            .iter()
            .filter(|s| !enabled_only || s.enabled)
            .cloned()
            .collect())
    }

    async fn lease_site(&self, args: LeaseSiteArgs) -> Result<Option<Site>> {
        let mut inner = self.inner.lock().unwrap();
        let now = now_ms();
        let lock_ms = (args.lock_seconds * 1000) as i64;

        let mut candidate: Option<usize> = None;
        for (idx, site) in inner.sites.iter().enumerate() {
            if !site.enabled {
                continue;
            }
            if let Some(expires) = site.lock_expires_at {
                // A live lock excludes the site even when a manual trigger
                // is pending.
                if expires > now {
                    continue;
                }
            }
            if let Some(site_type) = &args.site_type {
                if site.site_type.as_str() != site_type {
                    continue;
                }
            }
            if let Some(provider) = args.scrape_provider {
                if site.scrape_provider != Some(provider) {
                    continue;
                }
            }
            let manual = site.manual_trigger_at.is_some();
            match candidate {
                None => candidate = Some(idx),
                Some(current) => {
                    // Manual triggers jump the queue once their lock is free.
                    if manual && inner.sites[current].manual_trigger_at.is_none() {
                        candidate = Some(idx);
                    }
                }
            }
        }

        let Some(idx) = candidate else {
            return Ok(None);
        };
        let site = &mut inner.sites[idx];
        site.locked_by = Some(args.worker_id.clone());
        site.lock_expires_at = Some(now + lock_ms);
        site.last_run_at = Some(now);
        site.manual_trigger_at = None;
        Ok(Some(site.clone()))
    }

    async fn complete_site(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(site) = inner.sites.iter_mut().find(|s| s.id.as_deref() == Some(id)) {
            site.locked_by = None;
            site.lock_expires_at = None;
            site.completed += 1;
        }
        Ok(())
    }

    async fn fail_site(&self, id: &str, _error: Option<String>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(site) = inner.sites.iter_mut().find(|s| s.id.as_deref() == Some(id)) {
            site.locked_by = None;
            site.lock_expires_at = None;
            site.failed += 1;
        }
        Ok(())
    }

    async fn list_seen_job_urls_for_site(
        &self,
        source_url: &str,
        _pattern: Option<&str>,
    ) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .seen
            .get(source_url)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_existing_job_urls(&self, urls: &[String]) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(urls
            .iter()
            .filter(|url| inner.jobs.contains_key(*url))
            .cloned()
            .collect())
    }

    async fn enqueue_scrape_urls(&self, args: EnqueueScrapeUrls) -> Result<EnqueueResult> {
        let mut inner = self.inner.lock().unwrap();
        let now = now_ms();
        let mut queued = Vec::new();
        for url in args.urls {
            let key = (args.provider, url.clone());
            if let Some(existing) = inner.queue.get(&key) {
                if !existing.status.is_terminal() {
                    continue;
                }
            }
            inner.queue.insert(
                key,
                QueuedUrl {
                    url: url.clone(),
                    source_url: args.source_url.clone(),
                    pattern: args.pattern.clone(),
                    provider: args.provider,
                    status: QueueStatus::Pending,
                    attempts: 0,
                    created_at: now,
                    updated_at: now,
                    site_id: args.site_id.clone(),
                    error: None,
                },
            );
            queued.push(url);
        }
        Ok(EnqueueResult { queued })
    }

    async fn lease_scrape_url_batch(&self, args: LeaseScrapeUrlBatch) -> Result<Vec<QueuedUrl>> {
        let mut inner = self.inner.lock().unwrap();
        let now = now_ms();

        // Stale reclaim and 48 h TTL run before any lease.
        for row in inner.queue.values_mut() {
            if row.status == QueueStatus::Processing
                && now - row.updated_at > args.processing_expiry_ms
            {
                row.status = QueueStatus::Pending;
                row.updated_at = now;
            }
            if !row.status.is_terminal() && now - row.created_at > QUEUE_TTL_MS {
                row.status = QueueStatus::Failed;
                row.error = Some("stale (>48h)".into());
                row.updated_at = now;
            }
        }

        let mut keys: Vec<(ScrapeProvider, String)> = inner
            .queue
            .iter()
            .filter(|(_, row)| row.status == QueueStatus::Pending)
            .filter(|(_, row)| args.provider.map_or(true, |p| row.provider == p))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort_by(|a, b| {
            let ra = &inner.queue[a];
            let rb = &inner.queue[b];
            ra.created_at.cmp(&rb.created_at).then(a.1.cmp(&b.1))
        });
        keys.truncate(args.limit);

        let mut leased = Vec::new();
        for key in keys {
            let row = inner.queue.get_mut(&key).unwrap();
            row.status = QueueStatus::Processing;
            row.attempts += 1;
            row.updated_at = now;
            leased.push(row.clone());
        }
        Ok(leased)
    }

    async fn complete_scrape_urls(&self, args: CompleteScrapeUrls) -> Result<u32> {
        let mut inner = self.inner.lock().unwrap();
        let now = now_ms();
        let mut updated = 0;
        for url in &args.urls {
            for row in inner.queue.values_mut() {
                if &row.url != url || row.status.is_terminal() {
                    continue;
                }
                row.status = args.status;
                row.error = args.error.clone();
                row.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn list_queued_scrape_urls(&self, args: ListQueuedScrapeUrls) -> Result<Vec<QueuedUrl>> {
        let inner = self.inner.lock().unwrap();
        let limit = args.limit.min(LIST_LIMIT_CAP);
        let mut rows: Vec<QueuedUrl> = inner
            .queue
            .values()
            .filter(|row| args.provider.map_or(true, |p| row.provider == p))
            .filter(|row| args.status.map_or(true, |s| row.status == s))
            .filter(|row| {
                args.site_id
                    .as_deref()
                    .map_or(true, |id| row.site_id.as_deref() == Some(id))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn insert_scrape_record(&self, record: Value) -> Result<String> {
        let serialized = serde_json::to_string(&record)?;
        if serialized.len() > MAX_RECORD_BYTES {
            return Err(StoreError::Operation {
                op: crate::op::INSERT_SCRAPE_RECORD.into(),
                message: format!("document too large ({} bytes)", serialized.len()),
            });
        }
        let mut inner = self.inner.lock().unwrap();
        let id = inner.make_id("scr");
        inner.scrapes.push(record);
        Ok(id)
    }

    async fn ingest_jobs_from_scrape(
        &self,
        jobs: Vec<JobInput>,
        site_id: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let site_url = site_id.as_deref().and_then(|id| {
            inner
                .sites
                .iter()
                .find(|s| s.id.as_deref() == Some(id))
                .map(|s| s.url.clone())
        });
        for job in jobs {
            if job.url.is_empty() {
                continue;
            }
            if let Some(source) = &site_url {
                inner
                    .seen
                    .entry(source.clone())
                    .or_default()
                    .insert(job.url.clone());
            }
            inner.jobs.insert(job.url.clone(), job);
        }
        Ok(())
    }

    async fn insert_ignored_job(&self, job: IgnoredJob) -> Result<()> {
        self.inner.lock().unwrap().ignored.push(job);
        Ok(())
    }

    async fn insert_scrape_error(&self, row: ScrapeErrorRow) -> Result<()> {
        self.inner.lock().unwrap().errors.push(row);
        Ok(())
    }

    async fn insert_webhook_event(&self, mut row: WebhookEventRow) -> Result<Option<String>> {
        let mut inner = self.inner.lock().unwrap();
        // One pending placeholder per job id.
        if row.event == "pending"
            && inner
                .webhooks
                .iter()
                .any(|w| w.job_id == row.job_id && w.event == "pending")
        {
            return Ok(None);
        }
        let id = inner.make_id("wbh");
        row.id = Some(id.clone());
        inner.webhooks.push(row);
        Ok(Some(id))
    }

    async fn list_pending_webhooks(
        &self,
        limit: usize,
        event: Option<&str>,
    ) -> Result<Vec<WebhookEventRow>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .webhooks
            .iter()
            .filter(|w| w.processed_at.is_none())
            .filter(|w| event.map_or(true, |e| w.event == e))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_webhook_status(&self, job_id: &str) -> Result<Option<Value>> {
        let inner = self.inner.lock().unwrap();
        let rows: Vec<&WebhookEventRow> =
            inner.webhooks.iter().filter(|w| w.job_id == job_id).collect();
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_value(rows)?))
    }

    async fn mark_webhook_processed(&self, id: &str, error: Option<String>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let now = now_ms();
        if let Some(row) = inner
            .webhooks
            .iter_mut()
            .find(|w| w.id.as_deref() == Some(id))
        {
            if row.processed_at.is_none() {
                row.processed_at = Some(now);
                row.error = error;
            }
        }
        Ok(())
    }

    async fn list_pending_job_details(&self, limit: usize) -> Result<Vec<PendingJobDetail>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.pending_details.iter().take(limit).cloned().collect())
    }

    async fn count_pending_job_details(&self) -> Result<Option<u64>> {
        let inner = self.inner.lock().unwrap();
        Ok(Some(inner.pending_details.len() as u64))
    }

    async fn list_job_detail_configs(&self, domain: &str) -> Result<Vec<HeuristicConfig>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .heuristic_configs
            .iter()
            .filter(|c| c.domain == domain)
            .cloned()
            .collect())
    }

    async fn record_job_detail_heuristic(&self, config: HeuristicConfig) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let exists = inner.heuristic_configs.iter().any(|c| {
            c.domain == config.domain && c.field == config.field && c.regex == config.regex
        });
        if !exists {
            inner.heuristic_configs.push(config);
        }
        Ok(())
    }

    async fn update_job_with_heuristic(&self, id: &str, patch: Value) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .heuristic_patches
            .entry(id.to_string())
            .or_default()
            .push(patch);
        inner
            .pending_details
            .retain(|d| d.target_id() != Some(id));
        Ok(())
    }

    async fn record_workflow_run(&self, run: Value) -> Result<()> {
        self.inner.lock().unwrap().workflow_runs.push(run);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with_pending(url: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store.seed_queue_row(QueuedUrl {
            url: url.into(),
            source_url: "https://example.com/jobs".into(),
            pattern: None,
            provider: ScrapeProvider::Spidercloud,
            status: QueueStatus::Pending,
            attempts: 0,
            created_at: now_ms(),
            updated_at: now_ms(),
            site_id: None,
            error: None,
        });
        store
    }

    fn lease_args() -> LeaseScrapeUrlBatch {
        LeaseScrapeUrlBatch {
            provider: Some(ScrapeProvider::Spidercloud),
            limit: 50,
            processing_expiry_ms: 20 * 60 * 1000,
            max_per_minute_default: 50,
        }
    }

    #[tokio::test]
    async fn lease_transitions_pending_to_processing() {
        let store = store_with_pending("https://example.com/job/1");
        let batch = store.lease_scrape_url_batch(lease_args()).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].status, QueueStatus::Processing);
        assert_eq!(batch[0].attempts, 1);

        // Second lease returns nothing while the row is processing.
        let empty = store.lease_scrape_url_batch(lease_args()).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn stale_processing_rows_are_reclaimed() {
        let store = MemoryStore::new();
        store.seed_queue_row(QueuedUrl {
            url: "https://example.com/job/1".into(),
            source_url: "https://example.com/jobs".into(),
            pattern: None,
            provider: ScrapeProvider::Spidercloud,
            status: QueueStatus::Processing,
            attempts: 1,
            created_at: now_ms() - 25 * 60 * 1000,
            updated_at: now_ms() - 25 * 60 * 1000,
            site_id: None,
            error: None,
        });
        let batch = store.lease_scrape_url_batch(lease_args()).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].attempts, 2);
    }

    #[tokio::test]
    async fn rows_older_than_48h_fail_as_stale() {
        let store = MemoryStore::new();
        store.seed_queue_row(QueuedUrl {
            url: "https://example.com/job/old".into(),
            source_url: "https://example.com/jobs".into(),
            pattern: None,
            provider: ScrapeProvider::Spidercloud,
            status: QueueStatus::Pending,
            attempts: 0,
            created_at: now_ms() - 49 * 60 * 60 * 1000,
            updated_at: now_ms() - 49 * 60 * 60 * 1000,
            site_id: None,
            error: None,
        });
        let batch = store.lease_scrape_url_batch(lease_args()).await.unwrap();
        assert!(batch.is_empty());
        let row = store
            .queue_row(ScrapeProvider::Spidercloud, "https://example.com/job/old")
            .unwrap();
        assert_eq!(row.status, QueueStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("stale (>48h)"));
    }

    #[tokio::test]
    async fn enqueue_skips_non_terminal_duplicates() {
        let store = store_with_pending("https://example.com/job/1");
        let result = store
            .enqueue_scrape_urls(EnqueueScrapeUrls {
                urls: vec![
                    "https://example.com/job/1".into(),
                    "https://example.com/job/2".into(),
                ],
                source_url: "https://example.com/jobs".into(),
                provider: ScrapeProvider::Spidercloud,
                site_id: None,
                pattern: None,
            })
            .await
            .unwrap();
        assert_eq!(result.queued, vec!["https://example.com/job/2".to_string()]);
    }

    #[tokio::test]
    async fn complete_is_idempotent_on_terminal_rows() {
        let store = store_with_pending("https://example.com/job/1");
        store.lease_scrape_url_batch(lease_args()).await.unwrap();
        let first = store
            .complete_scrape_urls(CompleteScrapeUrls::completed(vec![
                "https://example.com/job/1".into(),
            ]))
            .await
            .unwrap();
        assert_eq!(first, 1);
        let second = store
            .complete_scrape_urls(CompleteScrapeUrls::failed(
                vec!["https://example.com/job/1".into()],
                "late error",
            ))
            .await
            .unwrap();
        assert_eq!(second, 0);
        let row = store
            .queue_row(ScrapeProvider::Spidercloud, "https://example.com/job/1")
            .unwrap();
        assert_eq!(row.status, QueueStatus::Completed);
    }

    #[tokio::test]
    async fn site_lease_is_exclusive_until_expiry() {
        let store = MemoryStore::new();
        store.seed_site(Site {
            url: "https://boards.greenhouse.io/acme".into(),
            enabled: true,
            ..Site::default()
        });

        let first = store
            .lease_site(LeaseSiteArgs::new("worker-a"))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .lease_site(LeaseSiteArgs::new("worker-b"))
            .await
            .unwrap();
        assert!(second.is_none(), "live lock must exclude other workers");
    }

    #[tokio::test]
    async fn manual_trigger_waits_for_live_lock() {
        let store = MemoryStore::new();
        let id = store.seed_site(Site {
            url: "https://boards.greenhouse.io/acme".into(),
            enabled: true,
            manual_trigger_at: Some(now_ms()),
            lock_expires_at: Some(now_ms() + 60_000),
            ..Site::default()
        });
        let leased = store
            .lease_site(LeaseSiteArgs::new("worker-a"))
            .await
            .unwrap();
        assert!(leased.is_none());

        store.complete_site(&id).await.unwrap();
        let leased = store
            .lease_site(LeaseSiteArgs::new("worker-a"))
            .await
            .unwrap();
        assert!(leased.is_some());
    }

    #[tokio::test]
    async fn ingested_jobs_feed_dedup_queries() {
        let store = MemoryStore::new();
        let site_id = store.seed_site(Site {
            url: "https://example.com/jobs".into(),
            enabled: true,
            ..Site::default()
        });
        store
            .ingest_jobs_from_scrape(
                vec![JobInput {
                    title: "Software Engineer".into(),
                    company: "Example".into(),
                    url: "https://example.com/job/1".into(),
                    ..JobInput::default()
                }],
                Some(site_id),
            )
            .await
            .unwrap();

        let existing = store
            .find_existing_job_urls(&["https://example.com/job/1".into()])
            .await
            .unwrap();
        assert_eq!(existing.len(), 1);

        let seen = store
            .list_seen_job_urls_for_site("https://example.com/jobs", None)
            .await
            .unwrap();
        assert_eq!(seen, vec!["https://example.com/job/1".to_string()]);
    }

    #[tokio::test]
    async fn oversized_scrape_records_are_rejected() {
        let store = MemoryStore::new();
        let record = json!({ "raw": "x".repeat(MAX_RECORD_BYTES + 1) });
        let err = store.insert_scrape_record(record).await.unwrap_err();
        assert!(matches!(err, StoreError::Operation { .. }));
    }

    #[tokio::test]
    async fn webhook_placeholder_is_unique_per_job() {
        let store = MemoryStore::new();
        let row = WebhookEventRow {
            job_id: "job-1".into(),
            event: "pending".into(),
            received_at: now_ms(),
            ..WebhookEventRow::default()
        };
        let first = store.insert_webhook_event(row.clone()).await.unwrap();
        assert!(first.is_some());
        let second = store.insert_webhook_event(row).await.unwrap();
        assert!(second.is_none());
    }
}
