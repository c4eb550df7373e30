use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use jobsignal_common::{
    HeuristicConfig, IgnoredJob, JobInput, PendingJobDetail, QueuedUrl, Site, WebhookEventRow,
};

use crate::error::{Result, StoreError};
use crate::{
    op, CompleteScrapeUrls, EnqueueResult, EnqueueScrapeUrls, LeaseScrapeUrlBatch, LeaseSiteArgs,
    ListQueuedScrapeUrls, ScrapeErrorRow, Store,
};

/// HTTP client for the named-operation store API. Queries and mutations
/// are POSTed to the deployment URL with the function path in the body;
/// responses arrive in a `{status, value | errorMessage}` envelope.
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(deployment_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: deployment_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn call(&self, endpoint: &str, name: &str, args: Value) -> Result<Value> {
        let body = json!({
            "path": name,
            "args": args,
            "format": "json",
        });
        let resp = self
            .client
            .post(format!("{}/api/{endpoint}", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let payload: Value = resp.json().await?;
        if !status.is_success() {
            return Err(StoreError::Operation {
                op: name.to_string(),
                message: payload.to_string(),
            });
        }
        match payload.get("status").and_then(Value::as_str) {
            Some("success") => Ok(payload.get("value").cloned().unwrap_or(Value::Null)),
            _ => {
                let message = payload
                    .get("errorMessage")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown store error")
                    .to_string();
                Err(StoreError::Operation {
                    op: name.to_string(),
                    message,
                })
            }
        }
    }

    pub async fn query(&self, name: &str, args: Value) -> Result<Value> {
        self.call("query", name, args).await
    }

    pub async fn mutation(&self, name: &str, args: Value) -> Result<Value> {
        self.call("mutation", name, args).await
    }

    async fn query_as<T: DeserializeOwned>(&self, name: &str, args: Value) -> Result<T> {
        let value = self.query(name, args).await?;
        Ok(serde_json::from_value(value)?)
    }
}

fn to_args<T: serde::Serialize>(args: &T) -> Result<Value> {
    Ok(serde_json::to_value(args)?)
}

#[async_trait]
impl Store for HttpStore {
    async fn list_sites(&self, enabled_only: bool) -> Result<Vec<Site>> {
        self.query_as(op::LIST_SITES, json!({ "enabledOnly": enabled_only }))
            .await
    }

    async fn lease_site(&self, args: LeaseSiteArgs) -> Result<Option<Site>> {
        let value = self.mutation(op::LEASE_SITE, to_args(&args)?).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn complete_site(&self, id: &str) -> Result<()> {
        match self.mutation(op::COMPLETE_SITE, json!({ "id": id })).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_id_validation() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn fail_site(&self, id: &str, error: Option<String>) -> Result<()> {
        let mut args = json!({ "id": id });
        if let Some(error) = error {
            args["error"] = Value::String(error);
        }
        match self.mutation(op::FAIL_SITE, args).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_id_validation() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn list_seen_job_urls_for_site(
        &self,
        source_url: &str,
        pattern: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut args = json!({ "sourceUrl": source_url });
        if let Some(pattern) = pattern {
            args["pattern"] = Value::String(pattern.to_string());
        }
        let value = self.query(op::LIST_SEEN_JOB_URLS_FOR_SITE, args).await?;
        let urls = value
            .get("urls")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(urls)
    }

    async fn find_existing_job_urls(&self, urls: &[String]) -> Result<Vec<String>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        let value = self
            .query(op::FIND_EXISTING_JOB_URLS, json!({ "urls": urls }))
            .await?;
        let existing = value
            .get("existing")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(existing)
    }

    async fn enqueue_scrape_urls(&self, args: EnqueueScrapeUrls) -> Result<EnqueueResult> {
        let value = self
            .mutation(op::ENQUEUE_SCRAPE_URLS, to_args(&args)?)
            .await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn lease_scrape_url_batch(&self, args: LeaseScrapeUrlBatch) -> Result<Vec<QueuedUrl>> {
        let value = self
            .mutation(op::LEASE_SCRAPE_URL_BATCH, to_args(&args)?)
            .await?;
        let urls = value.get("urls").cloned().unwrap_or(Value::Array(vec![]));
        Ok(serde_json::from_value(urls)?)
    }

    async fn complete_scrape_urls(&self, args: CompleteScrapeUrls) -> Result<u32> {
        let value = self
            .mutation(op::COMPLETE_SCRAPE_URLS, to_args(&args)?)
            .await?;
        Ok(value
            .get("updated")
            .and_then(Value::as_u64)
            .unwrap_or_default() as u32)
    }

    async fn list_queued_scrape_urls(&self, args: ListQueuedScrapeUrls) -> Result<Vec<QueuedUrl>> {
        self.query_as(op::LIST_QUEUED_SCRAPE_URLS, to_args(&args)?)
            .await
    }

    async fn insert_scrape_record(&self, record: Value) -> Result<String> {
        let value = self.mutation(op::INSERT_SCRAPE_RECORD, record).await?;
        match value {
            Value::String(id) => Ok(id),
            other => Ok(other.to_string()),
        }
    }

    async fn ingest_jobs_from_scrape(
        &self,
        jobs: Vec<JobInput>,
        site_id: Option<String>,
    ) -> Result<()> {
        let mut args = json!({ "jobs": jobs });
        if let Some(site_id) = site_id {
            args["siteId"] = Value::String(site_id);
        }
        self.mutation(op::INGEST_JOBS_FROM_SCRAPE, args).await?;
        Ok(())
    }

    async fn insert_ignored_job(&self, job: IgnoredJob) -> Result<()> {
        self.mutation(op::INSERT_IGNORED_JOB, to_args(&job)?)
            .await?;
        Ok(())
    }

    async fn insert_scrape_error(&self, row: ScrapeErrorRow) -> Result<()> {
        self.mutation(op::INSERT_SCRAPE_ERROR, to_args(&row)?)
            .await?;
        Ok(())
    }

    async fn insert_webhook_event(&self, row: WebhookEventRow) -> Result<Option<String>> {
        let value = self
            .mutation(op::INSERT_FIRECRAWL_WEBHOOK_EVENT, to_args(&row)?)
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn list_pending_webhooks(
        &self,
        limit: usize,
        event: Option<&str>,
    ) -> Result<Vec<WebhookEventRow>> {
        let mut args = json!({ "limit": limit });
        if let Some(event) = event {
            args["event"] = Value::String(event.to_string());
        }
        self.query_as(op::LIST_PENDING_FIRECRAWL_WEBHOOKS, args)
            .await
    }

    async fn get_webhook_status(&self, job_id: &str) -> Result<Option<Value>> {
        let value = self
            .query(op::GET_FIRECRAWL_WEBHOOK_STATUS, json!({ "jobId": job_id }))
            .await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn mark_webhook_processed(&self, id: &str, error: Option<String>) -> Result<()> {
        let mut args = json!({ "id": id });
        if let Some(error) = error {
            args["error"] = Value::String(error);
        }
        self.mutation(op::MARK_FIRECRAWL_WEBHOOK_PROCESSED, args)
            .await?;
        Ok(())
    }

    async fn list_pending_job_details(&self, limit: usize) -> Result<Vec<PendingJobDetail>> {
        self.query_as(op::LIST_PENDING_JOB_DETAILS, json!({ "limit": limit }))
            .await
    }

    async fn count_pending_job_details(&self) -> Result<Option<u64>> {
        let value = self
            .query(op::COUNT_PENDING_JOB_DETAILS, json!({}))
            .await?;
        Ok(extract_pending_count(&value))
    }

    async fn list_job_detail_configs(&self, domain: &str) -> Result<Vec<HeuristicConfig>> {
        self.query_as(op::LIST_JOB_DETAIL_CONFIGS, json!({ "domain": domain }))
            .await
    }

    async fn record_job_detail_heuristic(&self, config: HeuristicConfig) -> Result<()> {
        self.mutation(op::RECORD_JOB_DETAIL_HEURISTIC, to_args(&config)?)
            .await?;
        Ok(())
    }

    async fn update_job_with_heuristic(&self, id: &str, patch: Value) -> Result<()> {
        let mut args = json!({ "id": id });
        if let Value::Object(fields) = patch {
            for (key, value) in fields {
                args[key] = value;
            }
        }
        self.mutation(op::UPDATE_JOB_WITH_HEURISTIC, args).await?;
        Ok(())
    }

    async fn record_workflow_run(&self, run: Value) -> Result<()> {
        self.mutation(op::RECORD_WORKFLOW_RUN, run).await?;
        Ok(())
    }
}

/// Pull a numeric pending count from a bare number or a counter object.
pub fn extract_pending_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    for key in ["pending", "remaining", "count", "total"] {
        if let Some(n) = value.get(key).and_then(Value::as_u64) {
            return Some(n);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_count_accepts_bare_and_keyed_shapes() {
        assert_eq!(extract_pending_count(&json!(42)), Some(42));
        assert_eq!(extract_pending_count(&json!({ "pending": 7 })), Some(7));
        assert_eq!(extract_pending_count(&json!({ "total": 9 })), Some(9));
        assert_eq!(extract_pending_count(&json!({ "other": true })), None);
    }
}
