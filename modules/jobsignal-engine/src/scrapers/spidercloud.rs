use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Map, Value};

use jobsignal_common::{now_ms, JobSignalError, ScrapeProvider, Site};
use spidercloud_client::{ScrapeParams, SpiderEvent};

use crate::events::{log_provider_dispatch, log_sync_response};
use crate::greenhouse::{
    api_detail_urls, board_slug, extract_greenhouse_job_urls, is_greenhouse_api_url,
    load_greenhouse_board, regex_extract_job_urls, to_marketing_greenhouse_url,
};
use crate::handlers::ConfluentHandler;
use crate::markdown::{html_to_markdown, strip_known_nav_blocks};
use crate::normalize::{
    coerce_level, coerce_remote, derive_company_from_url, extract_greenhouse_json_markdown,
    is_placeholder_title, looks_like_error_landing, looks_like_listing_page,
    looks_like_listing_payload, title_from_markdown, title_from_url, title_with_required_keyword,
    NormalizedJob, UNKNOWN_COMPENSATION_REASON,
};
use crate::payload::{
    build_request_snapshot, mask_secret, trim_scrape_payload, IgnoredItem, ScrapeItems,
    ScrapePayload, TrimOptions,
};
use crate::traits::{ListingFetcher, SpiderApi};

use super::{DetailBatch, DetailScrapeResult, ListingPayload, Scraper, ScraperDeps};

pub const CAPTCHA_RETRY_LIMIT: usize = 2;
pub const CAPTCHA_PROXY_SEQUENCE: [&str; 2] = ["residential", "isp"];

const CAPTCHA_MARKERS: [&str; 7] = [
    "vercel security checkpoint",
    "checking your browser",
    "are you human",
    "captcha",
    "security check",
    "robot check",
    "access denied",
];

const CRAWL_ENDPOINT: &str = "https://api.spider.cloud/v1/crawl";

/// Streaming-cloud adapter. Opens one authenticated stream per URL and
/// folds the JSONL events into markdown + cost accounting; captcha walls
/// retry through alternate proxy egress.
pub struct SpidercloudScraper {
    api: Arc<dyn SpiderApi>,
    listing_http: Arc<dyn ListingFetcher>,
    deps: ScraperDeps,
}

enum UrlScrapeError {
    Captcha(String),
    Failed(JobSignalError),
}

struct UrlScrape {
    normalized: Option<NormalizedJob>,
    ignored: Option<IgnoredItem>,
    raw: Value,
    credits: Option<f64>,
    cost_milli_cents: Option<i64>,
}

impl SpidercloudScraper {
    pub fn new(
        api: Arc<dyn SpiderApi>,
        listing_http: Arc<dyn ListingFetcher>,
        deps: ScraperDeps,
    ) -> Self {
        Self {
            api,
            listing_http,
            deps,
        }
    }

    fn batch_size(&self) -> usize {
        self.deps.runtime.spidercloud_job_details_batch_size.min(50)
    }

    /// First markdown/text-like payload in an event. HTML-looking values
    /// are converted before they are returned.
    fn extract_markdown(event: &SpiderEvent) -> Option<String> {
        if let Some(md) = event
            .markdown
            .as_deref()
            .or(event.commonmark.as_deref())
            .filter(|s| !s.trim().is_empty())
        {
            return Some(md.to_string());
        }
        if let Some(html) = event
            .raw_html
            .as_deref()
            .or(event.html.as_deref())
            .filter(|s| !s.trim().is_empty())
        {
            return Some(html_to_markdown(html));
        }
        if let Some(content) = &event.content {
            if let Some(text) = Self::walk_for_text(content) {
                return Some(text);
            }
        }
        Self::walk_for_text(&Value::Object(event.extra.clone()))
    }

    fn walk_for_text(value: &Value) -> Option<String> {
        const KEYS: [&str; 8] = [
            "markdown",
            "commonmark",
            "content",
            "text",
            "body",
            "result",
            "html",
            "raw_html",
        ];
        match value {
            Value::String(s) if !s.trim().is_empty() => {
                let lower = s.to_lowercase();
                let looks_like_html = s.contains('<')
                    && s.contains('>')
                    && (lower.contains("<html") || lower.contains("<div") || lower.contains("<p"));
                Some(if looks_like_html {
                    html_to_markdown(s)
                } else {
                    s.clone()
                })
            }
            Value::Object(map) => {
                for (key, val) in map {
                    if KEYS.contains(&key.to_lowercase().as_str()) {
                        if let Value::String(s) = val {
                            if !s.trim().is_empty() {
                                let html_key =
                                    matches!(key.to_lowercase().as_str(), "html" | "raw_html");
                                let looks_like_html =
                                    html_key || (s.contains('<') && s.contains('>'));
                                return Some(if looks_like_html {
                                    html_to_markdown(s)
                                } else {
                                    s.clone()
                                });
                            }
                        }
                    }
                    if let Some(found) = Self::walk_for_text(val) {
                        return Some(found);
                    }
                }
                None
            }
            Value::Array(items) => items.iter().find_map(Self::walk_for_text),
            _ => None,
        }
    }

    fn walk_for_number(value: &Value, needle: &str) -> Vec<f64> {
        let mut out = Vec::new();
        match value {
            Value::Object(map) => {
                for (key, val) in map {
                    if let Some(n) = val.as_f64() {
                        if key.to_lowercase().contains(needle) {
                            out.push(n);
                        }
                    }
                    out.extend(Self::walk_for_number(val, needle));
                }
            }
            Value::Array(items) => {
                for item in items {
                    out.extend(Self::walk_for_number(item, needle));
                }
            }
            _ => {}
        }
        out
    }

    fn extract_credits(event: &SpiderEvent) -> Option<f64> {
        let mut candidates = Vec::new();
        if let Some(credits) = event.credits_used {
            candidates.push(credits);
        }
        candidates.extend(Self::walk_for_number(
            &Value::Object(event.extra.clone()),
            "credit",
        ));
        candidates.into_iter().fold(None, |acc, v| {
            Some(acc.map_or(v, |a: f64| a.max(v)))
        })
    }

    fn extract_cost_usd(event: &SpiderEvent) -> Option<f64> {
        let mut candidates = Vec::new();
        if let Some(cost) = event.total_cost {
            candidates.push(cost);
        }
        candidates.extend(Self::walk_for_number(
            &Value::Object(event.extra.clone()),
            "cost",
        ));
        candidates.into_iter().fold(None, |acc, v| {
            Some(acc.map_or(v, |a: f64| a.max(v)))
        })
    }

    /// A matched captcha marker when the payload looks like a bot check.
    pub fn detect_captcha(markdown: &str, events: &[SpiderEvent]) -> Option<String> {
        let mut haystack = markdown.to_lowercase();
        for event in events {
            for key in ["title", "reason", "description", "body", "message"] {
                let value = match key {
                    "title" => event.title.clone(),
                    _ => event
                        .extra
                        .get(key)
                        .and_then(Value::as_str)
                        .map(str::to_string),
                };
                if let Some(value) = value {
                    haystack.push(' ');
                    haystack.push_str(&value.to_lowercase());
                }
            }
        }
        CAPTCHA_MARKERS
            .iter()
            .find(|marker| haystack.contains(**marker))
            .map(|m| m.to_string())
    }

    fn title_from_events(events: &[SpiderEvent]) -> Option<String> {
        for event in events {
            if let Some(title) = event.title.as_deref().filter(|t| !t.trim().is_empty()) {
                return Some(title.trim().to_string());
            }
            for key in ["job_title", "heading"] {
                if let Some(title) = event
                    .extra
                    .get(key)
                    .and_then(Value::as_str)
                    .filter(|t| !t.trim().is_empty())
                {
                    return Some(title.trim().to_string());
                }
            }
        }
        None
    }

    /// Normalize one scraped page. Returns the job row, or the ignored
    /// entry explaining why the page was dropped.
    fn normalize_job(
        &self,
        url: &str,
        markdown: &str,
        events: &[SpiderEvent],
        started_at: i64,
        require_keywords: bool,
    ) -> (Option<NormalizedJob>, Option<IgnoredItem>) {
        let mut parsed_markdown = markdown.to_string();
        let mut parsed_title = None;
        if markdown.trim_start().starts_with(['{', '[']) {
            if looks_like_listing_payload(markdown) {
                return (
                    None,
                    Some(IgnoredItem {
                        url: url.to_string(),
                        title: "Listing payload".into(),
                        reason: "listing_payload".into(),
                        description: None,
                    }),
                );
            }
            let (text, title) = extract_greenhouse_json_markdown(markdown);
            parsed_markdown = text;
            parsed_title = title;
        }

        let cleaned = strip_known_nav_blocks(&parsed_markdown);

        let mut payload_title = Self::title_from_events(events).or(parsed_title.clone());
        if payload_title
            .as_deref()
            .map(is_placeholder_title)
            .unwrap_or(false)
        {
            payload_title = None;
        }
        let from_content;
        if payload_title.is_none() {
            payload_title = title_from_markdown(&cleaned);
            from_content = payload_title.is_some();
        } else {
            from_content = true;
        }

        let candidate_title = payload_title.clone().or(parsed_title);
        if looks_like_error_landing(candidate_title.as_deref(), &cleaned) {
            return (
                None,
                Some(IgnoredItem {
                    url: url.to_string(),
                    title: candidate_title.unwrap_or_else(|| "Unknown".into()),
                    reason: "error_landing".into(),
                    description: Some(cleaned),
                }),
            );
        }
        if ConfluentHandler::is_location_filter_url(url)
            || looks_like_listing_page(candidate_title.as_deref(), &cleaned)
        {
            return (
                None,
                Some(IgnoredItem {
                    url: url.to_string(),
                    title: candidate_title.unwrap_or_else(|| "Unknown".into()),
                    reason: "listing_page".into(),
                    description: Some(cleaned),
                }),
            );
        }

        let mut title = payload_title.unwrap_or_else(|| title_from_url(url));
        if from_content && !self.deps.filters.title_matches_required_keywords(Some(&title)) {
            if let Some(keyword_title) = title_with_required_keyword(&cleaned, &self.deps.filters) {
                title = keyword_title;
            }
        }
        if from_content && !self.deps.filters.title_matches_required_keywords(Some(&title)) {
            tracing::info!(url, title = %title, "dropping job without required keyword");
            if require_keywords {
                return (
                    None,
                    Some(IgnoredItem {
                        url: url.to_string(),
                        title,
                        reason: "missing_required_keyword".into(),
                        description: Some(cleaned),
                    }),
                );
            }
        }

        let company = {
            let derived = derive_company_from_url(url);
            if derived.is_empty() {
                "Unknown".to_string()
            } else {
                derived
            }
        };
        let remote = coerce_remote(None, "", &format!("{title}\n{cleaned}"));
        let level = coerce_level(None, &title);

        let job = NormalizedJob {
            job_title: title.clone(),
            title,
            company,
            location: if remote { "Remote" } else { "Unknown" }.to_string(),
            remote,
            level,
            description: cleaned,
            total_compensation: 0,
            compensation_unknown: true,
            compensation_reason: Some(UNKNOWN_COMPENSATION_REASON.to_string()),
            url: url.to_string(),
            apply_url: None,
            posted_at: started_at,
        };
        (Some(job), None)
    }

    async fn scrape_single_url(
        &self,
        url: &str,
        params: &ScrapeParams,
        attempt: usize,
    ) -> Result<UrlScrape, UrlScrapeError> {
        let started_at = now_ms();
        let mut local = params.clone();
        if is_greenhouse_api_url(url) {
            let proxy = local.proxy.take();
            local = ScrapeParams::raw_html_chrome();
            local.proxy = proxy;
        }

        let events = self
            .api
            .scrape_url(url, &local)
            .await
            .map_err(|err| {
                tracing::error!(url, error = %err, "SpiderCloud scrape failed");
                UrlScrapeError::Failed(JobSignalError::from_provider_message(
                    "spidercloud",
                    err.to_string(),
                ))
            })?;

        let markdown_parts: Vec<String> = events
            .iter()
            .filter_map(Self::extract_markdown)
            .filter(|part| !part.trim().is_empty())
            .collect();
        let mut markdown = markdown_parts.join("\n\n").trim().to_string();

        if let Some(marker) = Self::detect_captcha(&markdown, &events) {
            tracing::warn!(url, attempt, marker = %marker, "SpiderCloud captcha detected");
            return Err(UrlScrapeError::Captcha(marker));
        }

        if is_greenhouse_api_url(url) {
            let (text, _title) = extract_greenhouse_json_markdown(&markdown);
            markdown = text;
        }

        let credits = events.iter().filter_map(Self::extract_credits).fold(
            None,
            |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))),
        );
        let cost_usd = events.iter().filter_map(Self::extract_cost_usd).fold(
            None,
            |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))),
        );
        let mut cost_milli_cents = cost_usd.map(|usd| (usd * 100_000.0) as i64);
        if cost_milli_cents.is_none() {
            cost_milli_cents = credits.map(|c| (c * 10.0) as i64);
        }

        // The first attempt insists on title keywords; retries accept
        // whatever rendered so proxied fetches are not wasted.
        let require_keywords = attempt <= 1;
        let (normalized, ignored) =
            self.normalize_job(url, &markdown, &events, started_at, require_keywords);

        tracing::info!(
            url,
            events = events.len(),
            fragments = markdown_parts.len(),
            credits = credits.unwrap_or(0.0),
            cost_mc = cost_milli_cents.unwrap_or(0),
            "SpiderCloud stream finished"
        );

        let raw = json!({
            "url": url,
            "events": events.iter().map(SpiderEvent::to_value).collect::<Vec<_>>(),
            "markdown": markdown,
            "creditsUsed": credits,
        });
        Ok(UrlScrape {
            normalized,
            ignored,
            raw,
            credits,
            cost_milli_cents,
        })
    }

    /// Scrape a URL with the captcha retry ladder: up to two proxied
    /// retries, residential then isp. Exhaustion logs a failure marker
    /// and yields no row.
    async fn scrape_with_captcha_retries(
        &self,
        url: &str,
        params: &ScrapeParams,
    ) -> Result<Option<UrlScrape>, JobSignalError> {
        let mut attempt = 0usize;
        let mut proxy: Option<&str> = None;
        while attempt <= CAPTCHA_RETRY_LIMIT {
            attempt += 1;
            let mut local = params.clone();
            if let Some(proxy) = proxy {
                local.proxy = Some(proxy.to_string());
            }
            match self.scrape_single_url(url, &local, attempt).await {
                Ok(result) => return Ok(Some(result)),
                Err(UrlScrapeError::Captcha(marker)) => {
                    proxy = Some(
                        CAPTCHA_PROXY_SEQUENCE
                            [(attempt - 1).min(CAPTCHA_PROXY_SEQUENCE.len() - 1)],
                    );
                    tracing::warn!(
                        url,
                        attempt,
                        limit = CAPTCHA_RETRY_LIMIT + 1,
                        proxy,
                        marker = %marker,
                        "SpiderCloud captcha retry"
                    );
                    if attempt > CAPTCHA_RETRY_LIMIT {
                        log_sync_response(
                            "spidercloud",
                            "scrape",
                            url,
                            &format!("captcha_failed marker={marker}"),
                        );
                        return Ok(None);
                    }
                }
                Err(UrlScrapeError::Failed(err)) => return Err(err),
            }
        }
        Ok(None)
    }

    async fn scrape_urls_batch(
        &self,
        urls: Vec<String>,
        source_url: &str,
        pattern: Option<&str>,
    ) -> Result<ScrapePayload, JobSignalError> {
        let urls: Vec<String> = urls.into_iter().take(self.batch_size()).collect();
        let started_at = now_ms();
        tracing::info!(urls = urls.len(), pattern = pattern.unwrap_or(""), "SpiderCloud batch start");

        if urls.is_empty() {
            return Ok(ScrapePayload {
                source_url: source_url.to_string(),
                pattern: pattern.map(str::to_string),
                started_at,
                completed_at: now_ms(),
                provider: Some("spidercloud".into()),
                items: ScrapeItems {
                    provider: Some("spidercloud".into()),
                    ..ScrapeItems::default()
                },
                ..ScrapePayload::default()
            });
        }

        let api_mode = urls.iter().any(|u| is_greenhouse_api_url(u));
        let params = if api_mode {
            ScrapeParams::raw_html_chrome()
        } else {
            ScrapeParams::commonmark()
        };
        let requested_format = if api_mode { "raw_html" } else { "commonmark" };

        let concurrency = self
            .deps
            .runtime
            .spidercloud_job_details_concurrency
            .max(1);
        let results: Vec<(String, Result<Option<UrlScrape>, JobSignalError>)> =
            stream::iter(urls.iter().cloned().map(|url| {
                let params = params.clone();
                async move {
                    let result = self.scrape_with_captcha_retries(&url, &params).await;
                    (url, result)
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut normalized_items = Vec::new();
        let mut raw_items = Vec::new();
        let mut ignored_items = Vec::new();
        let mut total_cost_milli_cents = 0i64;
        let mut saw_cost = false;

        for (url, result) in results {
            let Some(result) = result? else {
                tracing::warn!(url = %url, "SpiderCloud giving up after captcha retries");
                continue;
            };
            let marketing_url = to_marketing_greenhouse_url(&url);
            if let Some(mut row) = result.normalized {
                if row.apply_url.is_none() {
                    row.apply_url = marketing_url;
                }
                normalized_items.push(row);
            }
            if let Some(ignored) = result.ignored {
                ignored_items.push(ignored);
            }
            raw_items.push(result.raw);
            if let Some(cost) = result.cost_milli_cents {
                total_cost_milli_cents += cost;
                saw_cost = true;
            } else if let Some(credits) = result.credits {
                total_cost_milli_cents += (credits * 10.0) as i64;
                saw_cost = true;
            }
        }

        let cost_milli_cents = saw_cost.then_some(total_cost_milli_cents);
        let provider_request = json!({
            "urls": urls,
            "params": serde_json::to_value(&params).unwrap_or(Value::Null),
            "contentType": "application/jsonl",
            "requestedFormat": requested_format,
        });
        let mut headers = Map::new();
        headers.insert(
            "authorization".into(),
            Value::String(format!(
                "Bearer {}",
                mask_secret(&self.deps.config.spider_api_key)
            )),
        );
        let request_snapshot = build_request_snapshot(
            provider_request.clone(),
            "spidercloud",
            "POST",
            CRAWL_ENDPOINT,
            headers,
        );

        let payload = ScrapePayload {
            source_url: source_url.to_string(),
            pattern: pattern.map(str::to_string),
            started_at,
            completed_at: now_ms(),
            provider: Some("spidercloud".into()),
            cost_milli_cents,
            sub_urls: urls.clone(),
            request: Some(request_snapshot.clone()),
            provider_request: Some(provider_request),
            items: ScrapeItems {
                normalized: normalized_items,
                raw: Some(Value::Array(raw_items)),
                provider: Some("spidercloud".into()),
                seed_urls: urls.clone(),
                ignored: ignored_items,
                request: Some(request_snapshot),
                requested_format: Some(requested_format.to_string()),
                cost_milli_cents,
                ..ScrapeItems::default()
            },
            ..ScrapePayload::default()
        };

        let (trimmed, _) = trim_scrape_payload(&payload, &TrimOptions::default());
        log_sync_response(
            "spidercloud",
            "scrape",
            source_url,
            &format!(
                "urls={} items={} cost_mc={}",
                urls.len(),
                trimmed.items.normalized.len(),
                cost_milli_cents.map_or("n/a".to_string(), |c| c.to_string()),
            ),
        );
        Ok(trimmed)
    }
}

#[async_trait]
impl Scraper for SpidercloudScraper {
    fn provider(&self) -> ScrapeProvider {
        ScrapeProvider::Spidercloud
    }

    async fn scrape_site(
        &self,
        site: &Site,
        skip_urls: Option<Vec<String>>,
    ) -> Result<ScrapePayload, JobSignalError> {
        let source_url = site.url.clone();
        let skip = match skip_urls {
            Some(skip) => skip,
            None => {
                self.deps
                    .seen_urls_for_site(&source_url, site.pattern.as_deref())
                    .await
            }
        };
        let skip_set: std::collections::HashSet<&String> = skip.iter().collect();
        let urls: Vec<String> = [source_url.clone()]
            .into_iter()
            .filter(|u| !u.trim().is_empty() && !skip_set.contains(u))
            .collect();

        log_provider_dispatch("spidercloud", &source_url, None, site.pattern.as_deref());
        self.scrape_urls_batch(urls, &source_url, site.pattern.as_deref())
            .await
    }

    /// Fetch a Greenhouse board JSON feed directly over HTTPS; the
    /// crawler is not needed for the listing itself.
    async fn fetch_greenhouse_listing(
        &self,
        site: &Site,
    ) -> Result<ListingPayload, JobSignalError> {
        let url = site.url.clone();
        let slug = board_slug(&url).unwrap_or_default();
        let api_url = if slug.is_empty() {
            url.clone()
        } else {
            format!("https://boards.greenhouse.io/v1/boards/{slug}/jobs")
        };

        tracing::info!(url = %url, slug = %slug, api_url = %api_url, "greenhouse listing fetch");
        log_provider_dispatch("spidercloud", &url, Some("greenhouse_board"), None);
        let started_at = now_ms();

        let raw_text = self.listing_http.get_text(&api_url).await.map_err(|err| {
            tracing::error!(api_url = %api_url, error = %err, "greenhouse listing http error");
            JobSignalError::from_provider_message(
                "spidercloud",
                format!("failed to fetch Greenhouse board: {err}"),
            )
        })?;

        let job_urls = match load_greenhouse_board(&raw_text) {
            Ok(board) => {
                let mut job_urls = extract_greenhouse_job_urls(&board, Some(&self.deps.filters));
                if !slug.is_empty() && !job_urls.is_empty() {
                    let api_urls = api_detail_urls(&board, &slug, &self.deps.filters);
                    if !api_urls.is_empty() {
                        job_urls = api_urls;
                    }
                }
                // A near-empty structured result usually means the board
                // rendered oddly; the URL regex recovers what it can.
                if job_urls.len() <= 1 {
                    let regex_urls = regex_extract_job_urls(&raw_text);
                    if !regex_urls.is_empty() {
                        job_urls = regex_urls;
                    }
                }
                job_urls
            }
            Err(err) => {
                tracing::error!(api_url = %api_url, error = %err, "greenhouse listing parse error");
                let regex_urls = regex_extract_job_urls(&raw_text);
                if regex_urls.is_empty() {
                    return Err(JobSignalError::Parse(format!(
                        "unable to parse Greenhouse board payload: {err}"
                    )));
                }
                regex_urls
            }
        };

        let completed_at = now_ms();
        log_sync_response(
            "spidercloud",
            "greenhouse_board",
            &url,
            &format!("job_urls={}", job_urls.len()),
        );
        Ok(ListingPayload {
            raw: raw_text,
            job_urls,
            started_at,
            completed_at,
        })
    }

    async fn scrape_greenhouse_jobs(
        &self,
        batch: &DetailBatch,
    ) -> Result<DetailScrapeResult, JobSignalError> {
        let mut seen = std::collections::HashSet::new();
        let urls: Vec<String> = batch
            .urls
            .iter()
            .filter(|u| !u.trim().is_empty())
            .filter(|u| seen.insert(u.to_string()))
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

        log_provider_dispatch(
            "spidercloud",
            &source_url,
            Some("greenhouse_jobs"),
            None,
        );
        let scrape = self
            .scrape_urls_batch(urls, &source_url, batch.pattern.as_deref())
            .await?;
        let jobs_scraped = scrape.items.normalized.len();
        tracing::info!(source_url = %source_url, jobs_scraped, "greenhouse jobs batch complete");
        Ok(DetailScrapeResult {
            scrape: Some(scrape),
            jobs_scraped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deps_with_store, MockSpider, StaticListing};
    use jobsignal_store::MemoryStore;

    fn scraper(api: MockSpider, listing: &str) -> SpidercloudScraper {
        let store = Arc::new(MemoryStore::new());
        SpidercloudScraper::new(
            Arc::new(api),
            Arc::new(StaticListing::new(listing)),
            deps_with_store(store),
        )
    }

    fn md_event(markdown: &str) -> SpiderEvent {
        SpiderEvent {
            markdown: Some(markdown.to_string()),
            credits_used: Some(2.0),
            ..SpiderEvent::default()
        }
    }

    #[test]
    fn captcha_detection_matches_known_markers() {
        let events = vec![SpiderEvent {
            title: Some("Vercel Security Checkpoint".into()),
            ..SpiderEvent::default()
        }];
        assert_eq!(
            SpidercloudScraper::detect_captcha("", &events).as_deref(),
            Some("vercel security checkpoint")
        );
        assert!(SpidercloudScraper::detect_captcha("all fine here", &[]).is_none());
    }

    #[tokio::test]
    async fn batch_normalizes_rows_and_prefers_marketing_apply_urls() {
        let api = MockSpider::returning(vec![md_event("# Senior Software Engineer\n\nGreat role")]);
        let scraper = scraper(api, "{}");
        let batch = DetailBatch {
            urls: vec!["https://boards-api.greenhouse.io/v1/boards/acme/jobs/12".into()],
            source_url: "https://boards.greenhouse.io/acme".into(),
            ..DetailBatch::default()
        };
        let result = scraper.scrape_greenhouse_jobs(&batch).await.unwrap();
        assert_eq!(result.jobs_scraped, 1);
        let scrape = result.scrape.unwrap();
        let row = &scrape.items.normalized[0];
        assert_eq!(
            row.apply_url.as_deref(),
            Some("https://boards.greenhouse.io/acme/jobs/12")
        );
        assert_eq!(row.url, "https://boards-api.greenhouse.io/v1/boards/acme/jobs/12");
        // Credits convert to milli-cents at x10.
        assert_eq!(scrape.cost_milli_cents, Some(20));
    }

    #[tokio::test]
    async fn captcha_exhaustion_drops_the_url_with_proxied_retries() {
        let api = MockSpider::always_captcha("Vercel Security Checkpoint");
        let scraper = scraper(api.clone(), "{}");
        let batch = DetailBatch {
            urls: vec!["https://example.com/job/1".into()],
            source_url: "https://example.com/jobs".into(),
            ..DetailBatch::default()
        };
        let result = scraper.scrape_greenhouse_jobs(&batch).await.unwrap();
        assert_eq!(result.jobs_scraped, 0);
        let proxies = api.seen_proxies();
        assert_eq!(
            proxies,
            vec![None, Some("residential".to_string()), Some("isp".to_string())]
        );
    }

    #[tokio::test]
    async fn listing_page_bodies_become_ignored_rows() {
        let api = MockSpider::returning(vec![md_event(
            "Open Positions\nSearch for Opportunities\nSelect Country",
        )]);
        let scraper = scraper(api, "{}");
        let batch = DetailBatch {
            urls: vec!["https://careers.confluent.io/jobs/united_states-engineering".into()],
            source_url: "https://careers.confluent.io/jobs".into(),
            ..DetailBatch::default()
        };
        let result = scraper.scrape_greenhouse_jobs(&batch).await.unwrap();
        assert_eq!(result.jobs_scraped, 0);
        let scrape = result.scrape.unwrap();
        assert_eq!(scrape.items.ignored.len(), 1);
        assert_eq!(scrape.items.ignored[0].reason, "listing_page");
    }

    #[tokio::test]
    async fn greenhouse_listing_prefers_api_detail_urls() {
        let board = r#"{"jobs": [
            {"absolute_url": "https://boards.greenhouse.io/robinhood/jobs/1", "id": 1, "title": "Software Engineer"},
            {"absolute_url": "https://boards.greenhouse.io/robinhood/jobs/2", "id": 2, "title": "Platform Developer"},
            {"absolute_url": "https://boards.greenhouse.io/robinhood/jobs/3", "id": 3, "title": "Recruiter"}
        ]}"#;
        let scraper = scraper(MockSpider::returning(vec![]), board);
        let site = Site {
            url: "https://api.greenhouse.io/v1/boards/robinhood/jobs".into(),
            site_type: jobsignal_common::SiteType::Greenhouse,
            enabled: true,
            ..Site::default()
        };
        let listing = scraper.fetch_greenhouse_listing(&site).await.unwrap();
        assert_eq!(
            listing.job_urls,
            vec![
                "https://boards-api.greenhouse.io/v1/boards/robinhood/jobs/1".to_string(),
                "https://boards-api.greenhouse.io/v1/boards/robinhood/jobs/2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn listing_parse_failure_falls_back_to_regex() {
        let html = r#"<html>see https://boards.greenhouse.io/acme/jobs/1 inside</html>"#;
        let scraper = scraper(MockSpider::returning(vec![]), html);
        let site = Site {
            url: "https://boards.greenhouse.io/acme".into(),
            enabled: true,
            ..Site::default()
        };
        let listing = scraper.fetch_greenhouse_listing(&site).await.unwrap();
        assert_eq!(
            listing.job_urls,
            vec!["https://boards.greenhouse.io/acme/jobs/1".to_string()]
        );
    }
}
