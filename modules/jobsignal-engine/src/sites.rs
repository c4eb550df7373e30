//! Site lease operations. Complete/fail guard on the store-id shape so
//! manually-registered test sites never hit the remote validator.

use std::sync::Arc;

use anyhow::Result;

use jobsignal_common::{looks_like_store_id, ScrapeProvider, Site};
use jobsignal_store::{LeaseSiteArgs, Store};

pub const DEFAULT_LOCK_SECONDS: u64 = 300;

/// Lease at most one site for this worker. Returns `None` when nothing
/// is currently eligible.
pub async fn lease_site(
    store: &Arc<dyn Store>,
    worker_id: &str,
    site_type: Option<&str>,
    provider: Option<ScrapeProvider>,
) -> Result<Option<Site>> {
    let leased = store
        .lease_site(LeaseSiteArgs {
            worker_id: worker_id.to_string(),
            lock_seconds: DEFAULT_LOCK_SECONDS,
            site_type: site_type.map(str::to_string),
            scrape_provider: provider,
        })
        .await?;
    if let Some(site) = &leased {
        tracing::info!(
            site_id = site.id.as_deref().unwrap_or(""),
            url = %site.url,
            provider = site.scrape_provider.map(|p| p.as_str()).unwrap_or(""),
            lock_expires_at = site.lock_expires_at.unwrap_or(0),
            "site leased"
        );
    }
    Ok(leased)
}

pub async fn complete_site(store: &Arc<dyn Store>, site: &Site) {
    let Some(id) = site.id.as_deref() else {
        return;
    };
    if !looks_like_store_id(id) {
        return;
    }
    if let Err(err) = store.complete_site(id).await {
        tracing::warn!(site_id = id, error = %err, "completeSite failed");
    }
}

pub async fn fail_site(store: &Arc<dyn Store>, site: &Site, error: String) {
    let Some(id) = site.id.as_deref() else {
        return;
    };
    if !looks_like_store_id(id) {
        return;
    }
    if let Err(err) = store.fail_site(id, Some(error)).await {
        tracing::warn!(site_id = id, error = %err, "failSite failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsignal_store::MemoryStore;

    #[tokio::test]
    async fn non_store_ids_are_skipped_silently() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn Store> = memory.clone();
        let site = Site {
            id: Some("manual-site".into()),
            url: "https://example.com".into(),
            enabled: true,
            ..Site::default()
        };
        // Must not error nor mutate anything.
        complete_site(&store, &site).await;
        fail_site(&store, &site, "boom".into()).await;
        assert!(memory.sites().is_empty());
    }

    #[tokio::test]
    async fn lease_and_complete_round_trip() {
        let memory = Arc::new(MemoryStore::new());
        let id = memory.seed_site(Site {
            url: "https://example.com/jobs".into(),
            enabled: true,
            ..Site::default()
        });
        let store: Arc<dyn Store> = memory.clone();

        let leased = lease_site(&store, "worker-1", None, None)
            .await
            .unwrap()
            .expect("site should lease");
        assert_eq!(leased.locked_by.as_deref(), Some("worker-1"));

        complete_site(&store, &leased).await;
        let site = memory
            .sites()
            .into_iter()
            .find(|s| s.id.as_deref() == Some(id.as_str()))
            .unwrap();
        assert!(site.lock_expires_at.is_none());
        assert_eq!(site.completed, 1);
    }
}
