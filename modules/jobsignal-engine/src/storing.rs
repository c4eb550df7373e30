//! The storage adapter: trim the scrape to the record budget, persist it
//! (with one aggressive-trim retry), derive and ingest job rows, record
//! ignored candidates, and enqueue URLs discovered in the payload.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde_json::{json, Value};

use jobsignal_common::{
    now_ms, FilterSettings, IgnoredJob, IgnoredReason, JobInput, RemoteCompanies, ScrapeProvider,
};
use jobsignal_store::Store;

use crate::enrich::{build_heuristic_patch, HeuristicRow};
use crate::events::{EventSink, TelemetryEvent};
use crate::greenhouse::to_marketing_greenhouse_url;
use crate::handlers::{get_site_handler, ConfluentHandler};
use crate::markdown::parse_markdown_hints;
use crate::normalize::{
    coerce_level, floor_char_boundary, parse_compensation, UNKNOWN_COMPENSATION_REASON,
};
use crate::payload::{trim_scrape_payload, ScrapePayload, TrimOptions};
use crate::queue::enqueue_new_urls;

static MARKDOWN_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^!])\[(?P<title>[^\]]+)\]\((?P<url>https?://[^\s)]+)\)").unwrap()
});
static GREENHOUSE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[\w.-]*greenhouse\.io/[^\s"'>]+"#).unwrap());
static APPLY_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bapply\b").unwrap());

const MAX_JOBS_TO_INGEST: usize = 400;

pub struct StorageAdapter {
    store: Arc<dyn Store>,
    filters: Arc<FilterSettings>,
    remote_companies: Arc<RemoteCompanies>,
    events: Arc<dyn EventSink>,
}

impl StorageAdapter {
    pub fn new(
        store: Arc<dyn Store>,
        filters: Arc<FilterSettings>,
        remote_companies: Arc<RemoteCompanies>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            filters,
            remote_companies,
            events,
        }
    }

    fn provider_tag(scrape: &ScrapePayload) -> Option<String> {
        scrape
            .items
            .provider
            .clone()
            .or_else(|| scrape.provider.clone())
    }

    fn queue_provider(scrape: &ScrapePayload) -> ScrapeProvider {
        Self::provider_tag(scrape)
            .and_then(|p| ScrapeProvider::from_str(&p).ok())
            .unwrap_or(ScrapeProvider::Spidercloud)
    }

    /// Persist one scrape cycle. Returns the scrape record id, or a
    /// synthetic `store-error:` marker when even the fallback insert
    /// failed — recording must never take the pipeline down.
    pub async fn store_scrape(&self, scrape: &ScrapePayload) -> Result<String> {
        let (trimmed, _) = trim_scrape_payload(scrape, &TrimOptions::default());
        let provider_tag = Self::provider_tag(scrape).unwrap_or_default();
        let normalized_count = trimmed.items.normalized.len();

        self.events.emit(
            TelemetryEvent::info(
                "scrape.received",
                scrape.source_url.as_str(),
                json!({
                    "provider": provider_tag,
                    "normalizedCount": normalized_count,
                    "ignoredCount": trimmed.items.ignored.len(),
                }),
            )
            .with_message(format!(
                "Scrape payload received for {} via {}",
                scrape.source_url,
                if provider_tag.is_empty() {
                    "unknown provider"
                } else {
                    &provider_tag
                }
            )),
        );

        let record = serde_json::to_value(&trimmed)?;
        let scrape_id = match self.store.insert_scrape_record(record).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(error = %err, "insertScrapeRecord failed; retrying with trimmed payload");
                let (mut fallback, _) = trim_scrape_payload(scrape, &TrimOptions::aggressive());
                fallback.items.truncated = Some(true);
                match self
                    .store
                    .insert_scrape_record(serde_json::to_value(&fallback)?)
                    .await
                {
                    Ok(id) => {
                        self.events.emit(TelemetryEvent::info(
                            "scrape.persisted.fallback",
                            scrape.source_url.as_str(),
                            json!({ "scrapeId": id, "provider": provider_tag }),
                        ));
                        id
                    }
                    Err(fallback_err) => {
                        tracing::error!(error = %fallback_err, "failed to persist scrape after fallback");
                        return Ok(format!("store-error:{}", now_ms()));
                    }
                }
            }
        };
        self.events.emit(TelemetryEvent::info(
            "scrape.persisted",
            scrape.source_url.as_str(),
            json!({ "scrapeId": scrape_id, "normalizedCount": normalized_count }),
        ));

        // Best-effort job ingestion from the untrimmed payload so long
        // descriptions survive into the jobs table.
        let jobs = self.jobs_from_scrape(scrape);
        if !jobs.is_empty() {
            let jobs = self.apply_heuristics(jobs).await;
            let site_id = scrape
                .site_id
                .clone()
                .filter(|id| jobsignal_common::looks_like_store_id(id));
            let count = jobs.len();
            match self.store.ingest_jobs_from_scrape(jobs, site_id).await {
                Ok(()) => {
                    self.events.emit(
                        TelemetryEvent::info(
                            "ingest.jobs",
                            scrape.source_url.as_str(),
                            json!({ "count": count }),
                        )
                        .with_message(format!(
                            "Ingested {count} jobs from {}",
                            scrape.source_url
                        )),
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, "job ingestion failed; scrape already recorded");
                }
            }
        }

        // Ignored entries keep future crawls from revisiting quickly.
        for entry in &scrape.items.ignored {
            let reason = entry
                .reason
                .parse::<IgnoredReasonWire>()
                .map(|w| w.0)
                .unwrap_or(IgnoredReason::Filtered);
            let mut description = entry.description.clone();
            if let Some(desc) = &mut description {
                desc.truncate(floor_char_boundary(desc, 4000));
            }
            let row = IgnoredJob {
                url: entry.url.clone(),
                title: if entry.title.trim().is_empty() {
                    "Unknown".into()
                } else {
                    entry.title.clone()
                },
                reason,
                source_url: Some(scrape.source_url.clone()),
                provider: Self::provider_tag(scrape),
                description,
            };
            if let Err(err) = self.store.insert_ignored_job(row).await {
                tracing::warn!(error = %err, "insertIgnoredJob failed");
            }
        }

        // Discovered URLs (further details and pagination) go back into
        // the queue.
        let urls = extract_job_urls_from_scrape(scrape);
        if urls.is_empty() {
            self.events.emit(TelemetryEvent::info(
                "scrape.url_extraction.none",
                scrape.source_url.as_str(),
                json!({}),
            ));
        } else {
            let site_id = scrape
                .site_id
                .clone()
                .filter(|id| jobsignal_common::looks_like_store_id(id));
            match enqueue_new_urls(
                &self.store,
                urls.clone(),
                scrape.source_url.as_str(),
                Self::queue_provider(scrape),
                site_id,
                scrape.pattern.clone(),
            )
            .await
            {
                Ok(queued) => {
                    self.events.emit(TelemetryEvent::info(
                        "scrape.url_enqueue",
                        scrape.source_url.as_str(),
                        json!({ "urls": urls.len(), "queued": queued.len() }),
                    ));
                }
                Err(err) => {
                    self.events.emit(TelemetryEvent::error(
                        "scrape.url_extraction.error",
                        scrape.source_url.as_str(),
                        json!({ "error": err.to_string() }),
                    ));
                }
            }
        }

        Ok(scrape_id)
    }

    /// Canonical job rows from normalized items, re-enriched from
    /// markdown hints; provider cost is split evenly across rows.
    pub fn jobs_from_scrape(&self, scrape: &ScrapePayload) -> Vec<JobInput> {
        let rows = &scrape.items.normalized;
        if rows.is_empty() {
            return Vec::new();
        }
        let now = now_ms();
        let provider = Self::provider_tag(scrape);
        let per_row_cost = scrape
            .cost_milli_cents
            .or(scrape.items.cost_milli_cents)
            .map(|total| total / rows.len().max(1) as i64);

        let mut jobs = Vec::new();
        for row in rows.iter().take(MAX_JOBS_TO_INGEST) {
            if row.url.is_empty() {
                continue;
            }
            let hints = parse_markdown_hints(&row.description);

            let mut title = row.title.clone();
            if title.is_empty() {
                title = "Untitled".into();
            }
            if let Some(hinted) = &hints.title {
                if title.to_lowercase().starts_with("job application for") {
                    title = hinted.clone();
                }
            }
            let mut location = row.location.clone();
            if (location.is_empty() || location == "Unknown") && hints.location.is_some() {
                location = hints.location.clone().unwrap();
            }
            let level = match &hints.level {
                Some(hinted) => coerce_level(Some(hinted), &title),
                None => row.level,
            };
            let mut total_comp = row.total_compensation;
            let mut compensation_unknown = row.compensation_unknown;
            let mut reason = row.compensation_reason.clone();
            if !compensation_unknown {
                let (parsed, unknown) =
                    parse_compensation(Some(&Value::from(row.total_compensation)));
                if unknown || parsed <= 0 {
                    compensation_unknown = true;
                }
            }
            if total_comp <= 0 {
                if let Some(hinted) = hints.compensation {
                    total_comp = hinted;
                    compensation_unknown = false;
                    reason = Some("parsed from description".into());
                }
            }
            let mut remote = row.remote;
            match hints.remote {
                Some(true) => remote = true,
                Some(false) => remote = false,
                None => {}
            }

            // Marketing URLs are canonical; the API endpoint is retained
            // as the apply URL.
            let (url, apply_url) = match to_marketing_greenhouse_url(&row.url) {
                Some(marketing) => (marketing, Some(row.url.clone())),
                None => (row.url.clone(), row.apply_url.clone()),
            };

            let reason = reason.or_else(|| {
                if compensation_unknown {
                    Some(UNKNOWN_COMPENSATION_REASON.to_string())
                } else if let Some(provider) = &provider {
                    Some(format!("{provider} extracted compensation"))
                } else {
                    Some("compensation provided in scrape payload".to_string())
                }
            });

            let mut description = row.description.clone();
            description.truncate(floor_char_boundary(
                &description,
                crate::normalize::MAX_DESCRIPTION_CHARS,
            ));
            jobs.push(JobInput {
                title,
                company: if row.company.is_empty() {
                    "Unknown".into()
                } else {
                    row.company.clone()
                },
                description,
                location,
                locations: Vec::new(),
                country: None,
                remote,
                level,
                total_compensation: total_comp.max(0),
                currency_code: None,
                compensation_unknown: Some(compensation_unknown),
                compensation_reason: reason,
                url,
                apply_url,
                posted_at: if row.posted_at > 0 { row.posted_at } else { now },
                scraped_at: Some(if scrape.completed_at > 0 {
                    scrape.completed_at
                } else {
                    now
                }),
                scraped_with: provider.clone(),
                scraped_cost_milli_cents: per_row_cost,
            });
        }
        jobs
    }

    /// Enrich job rows before ingestion. Learned regex configs are
    /// consulted per domain (cached for the batch) and new records are
    /// persisted best-effort.
    async fn apply_heuristics(&self, jobs: Vec<JobInput>) -> Vec<JobInput> {
        let now = now_ms();
        let mut config_cache: HashMap<String, Vec<jobsignal_common::HeuristicConfig>> =
            HashMap::new();
        let mut enriched = Vec::with_capacity(jobs.len());
        for mut job in jobs {
            let domain = crate::enrich::domain_from_url(&job.url);
            if !config_cache.contains_key(&domain) {
                let configs = self
                    .store
                    .list_job_detail_configs(&domain)
                    .await
                    .unwrap_or_default();
                config_cache.insert(domain.clone(), configs);
            }
            let (patch, records) = build_heuristic_patch(
                &HeuristicRow::from(&job),
                &config_cache[&domain],
                &self.filters,
                &self.remote_companies,
                now,
            );
            patch.apply_to(&mut job);
            for record in records {
                if let Err(err) = self.store.record_job_detail_heuristic(record).await {
                    tracing::debug!(error = %err, "heuristic record failed during ingestion");
                }
            }
            enriched.push(job);
        }
        enriched
    }
}

struct IgnoredReasonWire(IgnoredReason);

impl FromStr for IgnoredReasonWire {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let reason = match s {
            "missing_required_keyword" => IgnoredReason::MissingRequiredKeyword,
            "error_landing" => IgnoredReason::ErrorLanding,
            "listing_page" => IgnoredReason::ListingPage,
            "listing_payload" => IgnoredReason::ListingPayload,
            _ => IgnoredReason::Filtered,
        };
        Ok(IgnoredReasonWire(reason))
    }
}

fn looks_like_job_detail_url(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let path = parsed.path().to_lowercase();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for (idx, seg) in segments.iter().enumerate() {
        if matches!(
            *seg,
            "job" | "jobs" | "career" | "careers" | "position" | "positions"
        ) {
            return idx + 1 < segments.len();
        }
    }
    false
}

fn looks_like_apply_link(title: Option<&str>, url: &str) -> bool {
    if let Some(title) = title {
        if APPLY_TEXT_RE.is_match(title) {
            return true;
        }
    }
    let lower = url.to_lowercase();
    ["/apply", "/login", "/register", "/signup"]
        .iter()
        .any(|t| lower.contains(t))
}

fn text_bodies(raw: &Value, acc: &mut Vec<String>) {
    match raw {
        Value::String(s) => {
            if !s.trim().is_empty() {
                acc.push(s.clone());
            }
        }
        Value::Array(items) => {
            for item in items {
                text_bodies(item, acc);
            }
        }
        Value::Object(map) => {
            for key in ["content", "markdown", "commonmark", "raw_html", "html", "text", "body"] {
                if let Some(Value::String(s)) = map.get(key) {
                    if !s.trim().is_empty() {
                        acc.push(s.clone());
                    }
                }
            }
            for key in ["events", "raw", "items", "data"] {
                if let Some(nested) = map.get(key) {
                    text_bodies(nested, acc);
                }
            }
        }
        _ => {}
    }
}

/// Heuristic extraction of further job and pagination URLs from a scrape
/// payload: handler rules over raw bodies, markdown links with apply-link
/// rejection, and the Greenhouse URL regex.
pub fn extract_job_urls_from_scrape(scrape: &ScrapePayload) -> Vec<String> {
    let mut bodies = Vec::new();
    if let Some(raw) = &scrape.items.raw {
        text_bodies(raw, &mut bodies);
    }
    if let Some(preview) = &scrape.items.raw_preview {
        bodies.push(preview.clone());
    }
    if bodies.is_empty() {
        return Vec::new();
    }

    let source_url = scrape.source_url.as_str();
    let handler = get_site_handler(Some(source_url), None);
    let source_page = source_url
        .split('?')
        .nth(1)
        .and_then(|q| {
            q.split('&')
                .find(|p| p.to_lowercase().starts_with("page="))
                .map(|p| p.splitn(2, '=').nth(1).unwrap_or("").to_string())
        })
        .unwrap_or_else(|| "1".to_string());

    // URLs this scrape already covered must not round-trip back into the
    // queue through their own raw payloads.
    let own: std::collections::HashSet<&str> = scrape
        .sub_urls
        .iter()
        .map(String::as_str)
        .chain(scrape.items.seed_urls.iter().map(String::as_str))
        .chain(scrape.items.normalized.iter().map(|r| r.url.as_str()))
        .chain(
            scrape
                .items
                .normalized
                .iter()
                .filter_map(|r| r.apply_url.as_deref()),
        )
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    let mut push = |url: String| {
        if url == source_url || own.contains(url.as_str()) {
            return;
        }
        if ConfluentHandler::is_location_filter_url(&url) {
            return;
        }
        // Skip links that point back at the page we just scraped.
        if let Some(query) = url.split('?').nth(1) {
            if let Some(page) = query
                .split('&')
                .find(|p| p.to_lowercase().starts_with("page="))
                .map(|p| p.splitn(2, '=').nth(1).unwrap_or(""))
            {
                if page == source_page
                    && url.split('?').next().map(|p| p.trim_end_matches('/'))
                        == source_url.split('?').next().map(|p| p.trim_end_matches('/'))
                {
                    return;
                }
            }
        }
        if seen.insert(url.clone()) {
            urls.push(url);
        }
    };

    for body in &bodies {
        let lowered = body.to_lowercase();
        let looks_like_html =
            lowered.contains("<html") || lowered.contains("href=") || lowered.contains("<a ");
        // Listing API responses arrive as bare JSON or `<pre>`-wrapped
        // JSON; both feed the handler's structured extraction and
        // pagination rules.
        let json_payload: Option<Value> = if body.trim_start().starts_with(['{', '[']) {
            serde_json::from_str(body.trim()).ok()
        } else if looks_like_html {
            crate::handlers::extract_pre_json(body)
        } else {
            None
        };
        if let Some(handler) = handler {
            if let Some(payload) = &json_payload {
                for url in handler.job_urls_from_json(payload) {
                    push(url);
                }
                for url in handler.pagination_urls_from_json(payload, Some(source_url)) {
                    push(url);
                }
            }
            if looks_like_html {
                for url in handler.job_urls_from_html(body) {
                    push(url);
                }
            }
            for url in handler.job_urls_from_markdown(body) {
                push(url);
            }
        }
        if !looks_like_html {
            for caps in MARKDOWN_LINK_RE.captures_iter(body) {
                let title = caps.name("title").map(|m| m.as_str());
                let url = caps["url"].trim().to_string();
                if looks_like_apply_link(title, &url) {
                    continue;
                }
                if looks_like_job_detail_url(&url) {
                    push(url);
                }
            }
        }
        for m in GREENHOUSE_URL_RE.find_iter(body) {
            let url = m.as_str().trim().to_string();
            if url.contains("jobs") && !looks_like_apply_link(None, &url) {
                push(url);
            }
        }
    }
    urls
}
