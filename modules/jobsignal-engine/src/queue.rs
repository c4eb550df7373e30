//! Engine-side queue operations: lease wrappers with the seen-set
//! post-filter, completion helpers, and the discovery-time dedup that
//! keeps known URLs out of the queue.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;

use jobsignal_common::{now_ms, QueueStatus, QueuedUrl, RuntimeConfig, ScrapeProvider};
use jobsignal_store::{
    CompleteScrapeUrls, EnqueueScrapeUrls, LeaseScrapeUrlBatch, ListQueuedScrapeUrls, Store,
};

pub const QUEUE_TTL_MS: i64 = 48 * 60 * 60 * 1000;
pub const QUEUE_LIST_LIMIT: usize = 500;

/// A leased batch plus the URLs dropped because the seen set already
/// covers them.
#[derive(Debug, Default)]
pub struct LeasedBatch {
    pub urls: Vec<QueuedUrl>,
    pub skipped: Vec<String>,
}

/// Lease up to `limit` detail URLs. Rows whose source already ingested
/// them are failed out with `skip_listed_url` instead of being handed to
/// a worker; seen-set lookups are cached per (sourceUrl, pattern).
pub async fn lease_detail_batch(
    store: &Arc<dyn Store>,
    runtime: &RuntimeConfig,
    provider: Option<ScrapeProvider>,
    limit: usize,
) -> Result<LeasedBatch> {
    let leased = store
        .lease_scrape_url_batch(LeaseScrapeUrlBatch {
            provider,
            limit,
            processing_expiry_ms: runtime.processing_expiry_ms(),
            max_per_minute_default: runtime.spidercloud_job_details_batch_size,
        })
        .await?;

    let mut skip_cache: HashMap<(String, Option<String>), HashSet<String>> = HashMap::new();
    let mut filtered = Vec::new();
    let mut skipped = Vec::new();

    for row in leased {
        if row.url.trim().is_empty() {
            continue;
        }
        let key = (row.source_url.clone(), row.pattern.clone());
        if !skip_cache.contains_key(&key) {
            let seen = store
                .list_seen_job_urls_for_site(&key.0, key.1.as_deref())
                .await
                .unwrap_or_default();
            skip_cache.insert(key.clone(), seen.into_iter().collect());
        }
        if skip_cache[&key].contains(&row.url) {
            skipped.push(row.url);
            continue;
        }
        filtered.push(row);
    }

    if !skipped.is_empty() {
        if let Err(err) = store
            .complete_scrape_urls(CompleteScrapeUrls::failed(
                skipped.clone(),
                "skip_listed_url",
            ))
            .await
        {
            tracing::warn!(error = %err, "failed to mark skipped URLs as failed");
        }
    }

    Ok(LeasedBatch {
        urls: filtered,
        skipped,
    })
}

/// Terminal completion for a set of URLs. Errors are logged, never
/// propagated — completion is the mechanism that prevents permanent
/// `processing` rows and must run on every path.
pub async fn complete_urls_best_effort(
    store: &Arc<dyn Store>,
    urls: Vec<String>,
    status: QueueStatus,
    error: Option<String>,
) {
    if urls.is_empty() {
        return;
    }
    let args = CompleteScrapeUrls {
        urls,
        status,
        error,
    };
    if let Err(err) = store.complete_scrape_urls(args).await {
        tracing::warn!(error = %err, "completeScrapeUrls failed");
    }
}

/// Discovery-time enqueue: drop URLs already ingested, already in the
/// seen set, or already queued for this provider, then push the rest.
/// Rows older than the 48 h TTL found among the queued set are failed
/// out on the way.
pub async fn enqueue_new_urls(
    store: &Arc<dyn Store>,
    urls: Vec<String>,
    source_url: &str,
    provider: ScrapeProvider,
    site_id: Option<String>,
    pattern: Option<String>,
) -> Result<Vec<String>> {
    if urls.is_empty() {
        return Ok(Vec::new());
    }

    let mut skip: HashSet<String> = store
        .list_seen_job_urls_for_site(source_url, pattern.as_deref())
        .await
        .unwrap_or_default()
        .into_iter()
        .collect();
    skip.extend(
        store
            .find_existing_job_urls(&urls)
            .await
            .unwrap_or_default(),
    );

    let queued = store
        .list_queued_scrape_urls(ListQueuedScrapeUrls {
            provider: Some(provider),
            status: None,
            site_id: site_id.clone(),
            limit: QUEUE_LIST_LIMIT,
        })
        .await
        .unwrap_or_default();
    let now = now_ms();
    let mut stale = Vec::new();
    for row in queued {
        if row.status.is_terminal() {
            continue;
        }
        if row.created_at > 0 && row.created_at < now - QUEUE_TTL_MS {
            stale.push(row.url);
        } else {
            skip.insert(row.url);
        }
    }
    if !stale.is_empty() {
        complete_urls_best_effort(
            store,
            stale,
            QueueStatus::Failed,
            Some("stale (>48h)".into()),
        )
        .await;
    }

    let candidates: Vec<String> = urls
        .into_iter()
        .filter(|u| u.starts_with("http"))
        .filter(|u| !skip.contains(u))
        .collect();
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let result = store
        .enqueue_scrape_urls(EnqueueScrapeUrls {
            urls: candidates,
            source_url: source_url.to_string(),
            provider,
            site_id,
            pattern,
        })
        .await?;
    Ok(result.queued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsignal_common::JobInput;
    use jobsignal_store::MemoryStore;

    fn store_arc() -> (Arc<MemoryStore>, Arc<dyn Store>) {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn Store> = memory.clone();
        (memory, store)
    }

    #[tokio::test]
    async fn enqueue_drops_seen_existing_and_queued_urls() {
        let (memory, store) = store_arc();
        memory.seed_seen_urls("https://src.com/jobs", &["https://src.com/job/seen"]);
        memory.seed_job(JobInput {
            url: "https://src.com/job/existing".into(),
            title: "Software Engineer".into(),
            ..JobInput::default()
        });
        memory.seed_queue_row(QueuedUrl {
            url: "https://src.com/job/queued".into(),
            source_url: "https://src.com/jobs".into(),
            pattern: None,
            provider: ScrapeProvider::Spidercloud,
            status: QueueStatus::Pending,
            attempts: 0,
            created_at: now_ms(),
            updated_at: now_ms(),
            site_id: None,
            error: None,
        });

        let queued = enqueue_new_urls(
            &store,
            vec![
                "https://src.com/job/seen".into(),
                "https://src.com/job/existing".into(),
                "https://src.com/job/queued".into(),
                "https://src.com/job/new".into(),
                "not-a-url".into(),
            ],
            "https://src.com/jobs",
            ScrapeProvider::Spidercloud,
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(queued, vec!["https://src.com/job/new".to_string()]);
    }

    #[tokio::test]
    async fn enqueue_fails_out_expired_queued_rows() {
        let (memory, store) = store_arc();
        memory.seed_queue_row(QueuedUrl {
            url: "https://src.com/job/old".into(),
            source_url: "https://src.com/jobs".into(),
            pattern: None,
            provider: ScrapeProvider::Spidercloud,
            status: QueueStatus::Pending,
            attempts: 0,
            created_at: now_ms() - 49 * 60 * 60 * 1000,
            updated_at: now_ms() - 49 * 60 * 60 * 1000,
            site_id: None,
            error: None,
        });

        enqueue_new_urls(
            &store,
            vec!["https://src.com/job/new".into()],
            "https://src.com/jobs",
            ScrapeProvider::Spidercloud,
            None,
            None,
        )
        .await
        .unwrap();

        let row = memory
            .queue_row(ScrapeProvider::Spidercloud, "https://src.com/job/old")
            .unwrap();
        assert_eq!(row.status, QueueStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("stale (>48h)"));
    }

    #[tokio::test]
    async fn lease_filters_seen_urls_and_fails_them() {
        let (memory, store) = store_arc();
        memory.seed_seen_urls("https://src.com/jobs", &["https://src.com/job/1"]);
        for url in ["https://src.com/job/1", "https://src.com/job/2"] {
            memory.seed_queue_row(QueuedUrl {
                url: url.into(),
                source_url: "https://src.com/jobs".into(),
                pattern: None,
                provider: ScrapeProvider::Spidercloud,
                status: QueueStatus::Pending,
                attempts: 0,
                created_at: now_ms(),
                updated_at: now_ms(),
                site_id: None,
                error: None,
            });
        }

        let batch = lease_detail_batch(
            &store,
            &RuntimeConfig::default(),
            Some(ScrapeProvider::Spidercloud),
            50,
        )
        .await
        .unwrap();
        assert_eq!(batch.urls.len(), 1);
        assert_eq!(batch.urls[0].url, "https://src.com/job/2");
        assert_eq!(batch.skipped, vec!["https://src.com/job/1".to_string()]);

        let skipped_row = memory
            .queue_row(ScrapeProvider::Spidercloud, "https://src.com/job/1")
            .unwrap();
        assert_eq!(skipped_row.status, QueueStatus::Failed);
        assert_eq!(skipped_row.error.as_deref(), Some("skip_listed_url"));
    }
}
