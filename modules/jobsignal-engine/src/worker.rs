//! Worker roles and their tick loops. A worker process pins one role:
//! `general` leases sites, `job-details` leases URL batches,
//! `webhooks` sweeps pending callbacks, `heuristics` enriches pending
//! job rows. Leases make every tick safe to run from multiple processes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde_json::json;

use jobsignal_common::{
    now_ms, Config, FilterSettings, JobSignalError, QueueStatus, RemoteCompanies, RuntimeConfig,
    ScrapeProvider, Site, SiteType,
};
use jobsignal_store::{HttpStore, Store};

use crate::events::{EventSink, TracingSink};
use crate::handlers::get_site_handler;
use crate::payload::{ScrapeItems, ScrapePayload};
use crate::queue::{complete_urls_best_effort, enqueue_new_urls, lease_detail_batch};
use crate::scrapers::{
    select_provider, DetailBatch, FetchfoxScraper, FirecrawlScraper, Scraper, ScraperDeps,
    SpidercloudScraper,
};
use crate::sites::{complete_site, fail_site, lease_site};
use crate::storing::StorageAdapter;
use crate::traits::{FetchFoxApi, FirecrawlApi, ListingFetcher, SpiderApi};
use crate::webhooks::WebhookReconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WorkerRole {
    General,
    JobDetails,
    Webhooks,
    Heuristics,
    All,
}

/// Everything a worker needs, wired once at startup.
pub struct Engine {
    deps: ScraperDeps,
    remote_companies: Arc<RemoteCompanies>,
    storage: Arc<StorageAdapter>,
    reconciler: Arc<WebhookReconciler>,
    spidercloud: Arc<SpidercloudScraper>,
    firecrawl: Arc<FirecrawlScraper>,
    fetchfox: Arc<FetchfoxScraper>,
}

impl Engine {
    /// Construct against the remote store and the real provider clients.
    pub fn new(config: Config, runtime: RuntimeConfig) -> Result<Self> {
        let deployment = config
            .store_deployment_url()
            .context("CONVEX_URL env var is required for the store client")?;
        let store: Arc<dyn Store> = Arc::new(HttpStore::new(deployment));

        let listing_http = reqwest::Client::builder()
            .timeout(Duration::from_secs(runtime.spidercloud_http_timeout_seconds))
            .build()
            .context("failed to build HTTP client")?;

        let spider_api: Arc<dyn SpiderApi> = Arc::new(spidercloud_client::SpiderClient::new(
            config.spider_api_key.clone(),
        ));
        let firecrawl_api: Arc<dyn FirecrawlApi> = Arc::new(
            firecrawl_client::FirecrawlClient::new(config.firecrawl_api_key.clone()),
        );
        let fetchfox_api: Arc<dyn FetchFoxApi> = Arc::new(fetchfox_client::FetchFoxClient::new(
            config.fetchfox_api_key.clone(),
        ));

        Ok(Self::with_parts(
            store,
            Arc::new(config),
            runtime,
            Arc::new(FilterSettings::load()),
            Arc::new(RemoteCompanies::load()),
            Arc::new(TracingSink),
            spider_api,
            Arc::new(listing_http),
            firecrawl_api,
            fetchfox_api,
        ))
    }

    /// Wire an engine from parts. Tests inject the memory store and mock
    /// provider APIs here.
    #[allow(clippy::too_many_arguments)]
    pub fn with_parts(
        store: Arc<dyn Store>,
        config: Arc<Config>,
        runtime: RuntimeConfig,
        filters: Arc<FilterSettings>,
        remote_companies: Arc<RemoteCompanies>,
        events: Arc<dyn EventSink>,
        spider_api: Arc<dyn SpiderApi>,
        listing_http: Arc<dyn ListingFetcher>,
        firecrawl_api: Arc<dyn FirecrawlApi>,
        fetchfox_api: Arc<dyn FetchFoxApi>,
    ) -> Self {
        let deps = ScraperDeps {
            store: store.clone(),
            config,
            runtime,
            filters: filters.clone(),
            events: events.clone(),
        };
        let storage = Arc::new(StorageAdapter::new(
            store.clone(),
            filters.clone(),
            remote_companies.clone(),
            events,
        ));
        let reconciler = Arc::new(WebhookReconciler::new(
            firecrawl_api.clone(),
            store,
            filters,
        ));
        Self {
            spidercloud: Arc::new(SpidercloudScraper::new(
                spider_api,
                listing_http,
                deps.clone(),
            )),
            firecrawl: Arc::new(FirecrawlScraper::new(firecrawl_api, deps.clone())),
            fetchfox: Arc::new(FetchfoxScraper::new(fetchfox_api, deps.clone())),
            storage,
            reconciler,
            remote_companies,
            deps,
        }
    }

    pub fn storage(&self) -> &StorageAdapter {
        &self.storage
    }

    fn scraper_for(&self, provider: ScrapeProvider) -> Arc<dyn Scraper> {
        match provider {
            ScrapeProvider::Spidercloud => self.spidercloud.clone(),
            ScrapeProvider::Firecrawl => self.firecrawl.clone(),
            ScrapeProvider::Fetchfox => self.fetchfox.clone(),
        }
    }

    /// One general tick: lease at most one site, scrape it, store the
    /// result, release the lease. Returns whether a site was processed.
    pub async fn run_general_tick(&self, worker_id: &str) -> Result<bool> {
        let Some(site) = lease_site(&self.deps.store, worker_id, None, None).await? else {
            return Ok(false);
        };
        match self.scrape_leased_site(&site).await {
            Ok(()) => {
                complete_site(&self.deps.store, &site).await;
                self.record_workflow_run(&site, "completed", None).await;
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(url = %site.url, error = %err, "site scrape failed");
                fail_site(&self.deps.store, &site, err.to_string()).await;
                self.record_workflow_run(&site, "failed", Some(err.to_string()))
                    .await;
                // Configuration errors must stop scheduling; everything
                // else is the next tick's problem.
                match err {
                    JobSignalError::Config(_) => Err(err.into()),
                    _ => Ok(true),
                }
            }
        }
    }

    async fn scrape_leased_site(&self, site: &Site) -> Result<(), JobSignalError> {
        let provider = select_provider(site, &self.deps.config)?;
        let scraper = self.scraper_for(provider);
        tracing::info!(
            provider = provider.as_str(),
            url = %site.url,
            site_type = site.site_type.as_str(),
            "scrape dispatch"
        );

        // Greenhouse boards on the streaming crawler fan out: the listing
        // only discovers and queues detail URLs; detail workers do the
        // scraping.
        if provider == ScrapeProvider::Spidercloud && site.site_type == SiteType::Greenhouse {
            return self.greenhouse_listing_fanout(site).await;
        }

        // Template-crawl sites hand discovered URLs to the streaming
        // detail workers when that crawler is configured too.
        if provider == ScrapeProvider::Fetchfox && !self.deps.config.spider_api_key.is_empty() {
            let payload = self.fetchfox.crawl_site(site).await?;
            return self
                .storage
                .store_scrape(&payload)
                .await
                .map(|_| ())
                .map_err(|err| JobSignalError::Store(err.to_string()));
        }

        let payload = scraper.scrape_site(site, None).await?;
        self.storage
            .store_scrape(&payload)
            .await
            .map_err(|err| JobSignalError::Store(err.to_string()))?;
        Ok(())
    }

    async fn greenhouse_listing_fanout(&self, site: &Site) -> Result<(), JobSignalError> {
        let listing = self.spidercloud.fetch_greenhouse_listing(site).await?;
        let urls = listing.job_urls.clone();
        let site_id = site.store_id().map(str::to_string);

        let queued = enqueue_new_urls(
            &self.deps.store,
            urls.clone(),
            &site.url,
            ScrapeProvider::Spidercloud,
            site_id.clone(),
            site.pattern.clone(),
        )
        .await
        .map_err(|err| JobSignalError::Store(err.to_string()))?;

        tracing::info!(
            url = %site.url,
            discovered = urls.len(),
            queued = queued.len(),
            "greenhouse listing fanned out"
        );

        // Record the listing cycle. No raw body: the interesting output
        // is the URL set, already queued above.
        let payload = ScrapePayload {
            source_url: site.url.clone(),
            pattern: site.pattern.clone(),
            started_at: listing.started_at,
            completed_at: listing.completed_at,
            provider: Some("spidercloud".into()),
            workflow_name: Some("GreenhouseListing".into()),
            site_id,
            items: ScrapeItems {
                provider: Some("spidercloud".into()),
                job_urls: urls,
                queued: Some(true),
                queued_count: Some(queued.len()),
                ..ScrapeItems::default()
            },
            ..ScrapePayload::default()
        };
        self.storage
            .store_scrape(&payload)
            .await
            .map_err(|err| JobSignalError::Store(err.to_string()))?;
        Ok(())
    }

    /// One job-details tick: lease a batch, scrape it through the
    /// streaming crawler, store, and terminally complete every leased
    /// URL — success or failure, no row may stay `processing`.
    pub async fn run_job_details_tick(&self) -> Result<usize> {
        let batch = lease_detail_batch(
            &self.deps.store,
            &self.deps.runtime,
            Some(ScrapeProvider::Spidercloud),
            self.deps.runtime.spidercloud_job_details_batch_size,
        )
        .await?;
        if batch.urls.is_empty() {
            return Ok(0);
        }

        let leased_urls: Vec<String> = batch.urls.iter().map(|row| row.url.clone()).collect();
        let scrape_urls: Vec<String> = leased_urls
            .iter()
            .map(|url| to_greenhouse_api_url(url))
            .collect();
        let source_url = batch
            .urls
            .iter()
            .map(|row| row.source_url.clone())
            .find(|s| !s.is_empty())
            .unwrap_or_default();
        let pattern = batch.urls.iter().find_map(|row| row.pattern.clone());

        let detail_batch = DetailBatch {
            urls: scrape_urls,
            source_url,
            pattern,
            idempotency_key: None,
        };
        match self.spidercloud.scrape_greenhouse_jobs(&detail_batch).await {
            Ok(result) => {
                if let Some(scrape) = result.scrape {
                    if let Err(err) = self.storage.store_scrape(&scrape).await {
                        tracing::warn!(error = %err, "failed to store detail batch scrape");
                    }
                }
                complete_urls_best_effort(
                    &self.deps.store,
                    leased_urls.clone(),
                    QueueStatus::Completed,
                    None,
                )
                .await;
                Ok(leased_urls.len())
            }
            Err(err) => {
                complete_urls_best_effort(
                    &self.deps.store,
                    leased_urls,
                    QueueStatus::Failed,
                    Some(err.to_string()),
                )
                .await;
                Err(err.into())
            }
        }
    }

    pub async fn run_webhook_tick(&self) -> Result<usize> {
        self.reconciler.process_pending(&self.storage, 25).await
    }

    pub async fn run_heuristics_tick(&self) -> Result<usize> {
        let summary = crate::enrich::process_pending_job_details_batch(
            &self.deps.store,
            &self.deps.filters,
            &self.remote_companies,
            25,
        )
        .await?;
        Ok(summary.processed)
    }

    /// Best-effort run bookkeeping; recording must never fail the parent.
    async fn record_workflow_run(&self, site: &Site, status: &str, error: Option<String>) {
        let run = json!({
            "workflowId": format!("scrape-{}", site.id.as_deref().unwrap_or("unknown")),
            "workflowName": "ScrapeSite",
            "status": status,
            "siteUrl": site.url,
            "error": error,
            "recordedAt": now_ms(),
        });
        if let Err(err) = self.deps.store.record_workflow_run(run).await {
            tracing::debug!(error = %err, "recordWorkflowRun failed");
        }
    }

    /// Run one tick of every role. Used by `--once` and by tests.
    pub async fn run_once(&self, worker_id: &str) -> Result<()> {
        self.run_general_tick(worker_id).await?;
        self.run_job_details_tick().await?;
        self.run_webhook_tick().await?;
        self.run_heuristics_tick().await?;
        Ok(())
    }

    /// Long-running loop for one role. Ticks repeat on a fixed cadence
    /// with a little jitter so fleets do not synchronize; per-tick errors
    /// are logged and the loop continues unless configuration is broken.
    pub async fn run_loop(&self, role: WorkerRole, worker_id: &str, cadence: Duration) -> Result<()> {
        tracing::info!(?role, worker_id, cadence_secs = cadence.as_secs(), "worker loop started");
        loop {
            let result: Result<()> = match role {
                WorkerRole::General => self.run_general_tick(worker_id).await.map(|_| ()),
                WorkerRole::JobDetails => self.run_job_details_tick().await.map(|_| ()),
                WorkerRole::Webhooks => self.run_webhook_tick().await.map(|_| ()),
                WorkerRole::Heuristics => self.run_heuristics_tick().await.map(|_| ()),
                WorkerRole::All => self.run_once(worker_id).await,
            };
            if let Err(err) = result {
                if err.downcast_ref::<JobSignalError>().map_or(false, |e| {
                    matches!(e, JobSignalError::Config(_))
                }) {
                    return Err(err);
                }
                tracing::warn!(?role, error = %err, "worker tick failed");
            }
            let jitter = rand::rng().random_range(0..=cadence.as_millis().max(1) as u64 / 10);
            tokio::time::sleep(cadence + Duration::from_millis(jitter)).await;
        }
    }
}

/// Rewrite Greenhouse-hosted career URLs carrying `gh_jid`/board params
/// into the canonical boards-api detail URL so the crawler hits the JSON
/// API instead of the marketing site.
pub fn to_greenhouse_api_url(url: &str) -> String {
    if let Some(handler) = get_site_handler(Some(url), None) {
        if handler.name() == "greenhouse" {
            if let Some(api) = handler.api_detail_url(url) {
                return api;
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greenhouse_urls_rewrite_to_api_details() {
        assert_eq!(
            to_greenhouse_api_url(
                "https://coreweave.com/careers/job?4607747006&board=coreweave&gh_jid=4607747006"
            ),
            "https://boards-api.greenhouse.io/v1/boards/coreweave/jobs/4607747006"
        );
        assert_eq!(
            to_greenhouse_api_url("https://example.com/job/1"),
            "https://example.com/job/1"
        );
    }
}
