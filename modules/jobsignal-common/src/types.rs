use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Epoch milliseconds, the timestamp unit used everywhere in the store.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// --- Providers ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeProvider {
    Spidercloud,
    Firecrawl,
    Fetchfox,
}

impl ScrapeProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeProvider::Spidercloud => "spidercloud",
            ScrapeProvider::Firecrawl => "firecrawl",
            ScrapeProvider::Fetchfox => "fetchfox",
        }
    }
}

impl std::fmt::Display for ScrapeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScrapeProvider {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spidercloud" => Ok(Self::Spidercloud),
            "firecrawl" => Ok(Self::Firecrawl),
            "fetchfox" => Ok(Self::Fetchfox),
            other => Err(format!("unknown ScrapeProvider: {other}")),
        }
    }
}

// --- Site families ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SiteType {
    Greenhouse,
    Ashby,
    GithubCareers,
    Avature,
    Workday,
    Openai,
    Netflix,
    Uber,
    Cisco,
    Confluent,
    Docusign,
    Notion,
    #[default]
    #[serde(alias = "general")]
    Generic,
}

impl SiteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteType::Greenhouse => "greenhouse",
            SiteType::Ashby => "ashby",
            SiteType::GithubCareers => "github-careers",
            SiteType::Avature => "avature",
            SiteType::Workday => "workday",
            SiteType::Openai => "openai",
            SiteType::Netflix => "netflix",
            SiteType::Uber => "uber",
            SiteType::Cisco => "cisco",
            SiteType::Confluent => "confluent",
            SiteType::Docusign => "docusign",
            SiteType::Notion => "notion",
            SiteType::Generic => "generic",
        }
    }
}

impl std::fmt::Display for SiteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SiteType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "greenhouse" => Ok(Self::Greenhouse),
            "ashby" => Ok(Self::Ashby),
            "github-careers" | "github_careers" => Ok(Self::GithubCareers),
            "avature" => Ok(Self::Avature),
            "workday" => Ok(Self::Workday),
            "openai" => Ok(Self::Openai),
            "netflix" => Ok(Self::Netflix),
            "uber" => Ok(Self::Uber),
            "cisco" => Ok(Self::Cisco),
            "confluent" => Ok(Self::Confluent),
            "docusign" => Ok(Self::Docusign),
            "notion" => Ok(Self::Notion),
            "generic" | "general" | "" => Ok(Self::Generic),
            other => Err(format!("unknown SiteType: {other}")),
        }
    }
}

// --- Sites ---

/// A monitored careers endpoint as stored remotely.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    #[serde(rename = "type", default)]
    pub site_type: SiteType,
    /// URL-pattern glob scoping accepted detail URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_provider: Option<ScrapeProvider>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_trigger_at: Option<i64>,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub failed: u32,
}

impl Site {
    /// Worker-side view of the store-native id: ids that do not look like
    /// store documents (tests, manual flows) are treated as absent.
    pub fn store_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| looks_like_store_id(id))
    }
}

/// Store document ids are long alphanumeric strings; anything else is a
/// test/manual identifier that complete/fail must not send upstream.
pub fn looks_like_store_id(value: &str) -> bool {
    value.len() >= 26 && value.chars().all(|c| c.is_ascii_alphanumeric())
}

// --- URL queue ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the job-detail URL queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedUrl {
    pub url: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub provider: ScrapeProvider,
    #[serde(default)]
    pub status: QueueStatus,
    #[serde(default)]
    pub attempts: u32,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Jobs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobLevel {
    Junior,
    #[default]
    Mid,
    Senior,
    Staff,
    Intern,
}

impl JobLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobLevel::Junior => "junior",
            JobLevel::Mid => "mid",
            JobLevel::Senior => "senior",
            JobLevel::Staff => "staff",
            JobLevel::Intern => "intern",
        }
    }
}

impl std::fmt::Display for JobLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical job row handed to `router:ingestJobsFromScrape`.
/// Upserts are keyed by `url`, so re-ingestion is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    pub title: String,
    pub company: String,
    pub description: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub remote: bool,
    pub level: JobLevel,
    pub total_compensation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_unknown: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_reason: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_url: Option<String>,
    pub posted_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_with: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_cost_milli_cents: Option<i64>,
}

// --- Ignored jobs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoredReason {
    MissingRequiredKeyword,
    ErrorLanding,
    ListingPage,
    ListingPayload,
    Filtered,
}

impl IgnoredReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoredReason::MissingRequiredKeyword => "missing_required_keyword",
            IgnoredReason::ErrorLanding => "error_landing",
            IgnoredReason::ListingPage => "listing_page",
            IgnoredReason::ListingPayload => "listing_payload",
            IgnoredReason::Filtered => "filtered",
        }
    }
}

impl std::fmt::Display for IgnoredReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dropped candidate recorded so future crawls can skip it quickly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoredJob {
    pub url: String,
    pub title: String,
    pub reason: IgnoredReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// --- Webhook events ---

/// A batch-async provider callback, or the pending placeholder inserted
/// when the batch is dispatched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventRow {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub job_id: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub received_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Heuristic enrichment ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeuristicField {
    Location,
    Compensation,
}

impl HeuristicField {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeuristicField::Location => "location",
            HeuristicField::Compensation => "compensation",
        }
    }
}

/// A learned regex that matched a job description for some domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeuristicConfig {
    pub domain: String,
    pub field: HeuristicField,
    pub regex: String,
}

/// A job row still missing location or compensation, as returned by
/// `router:listPendingJobDetails`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PendingJobDetail {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub remote: Option<bool>,
    #[serde(default)]
    pub total_compensation: Option<i64>,
    #[serde(default)]
    pub compensation_unknown: Option<bool>,
    #[serde(default)]
    pub compensation_reason: Option<String>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub heuristic_attempts: Option<u32>,
}

impl PendingJobDetail {
    pub fn target_id(&self) -> Option<&str> {
        self.job_id.as_deref().or(self.id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_through_strings() {
        for p in [
            ScrapeProvider::Spidercloud,
            ScrapeProvider::Firecrawl,
            ScrapeProvider::Fetchfox,
        ] {
            assert_eq!(p.as_str().parse::<ScrapeProvider>().unwrap(), p);
        }
    }

    #[test]
    fn site_type_accepts_general_alias() {
        assert_eq!("general".parse::<SiteType>().unwrap(), SiteType::Generic);
        assert_eq!("".parse::<SiteType>().unwrap(), SiteType::Generic);
    }

    #[test]
    fn store_id_shape_check() {
        assert!(looks_like_store_id("jd7f8a9b0c1d2e3f4g5h6i7j8k9l0m"));
        assert!(!looks_like_store_id("site-1"));
        assert!(!looks_like_store_id("short"));
        assert!(!looks_like_store_id("jd7f8a9b0c1d2e3f4g5h6i7j8k9l0m!"));
    }

    #[test]
    fn site_store_id_filters_non_store_ids() {
        let mut site = Site {
            id: Some("manual-test-site".into()),
            url: "https://example.com".into(),
            ..Site::default()
        };
        assert!(site.store_id().is_none());
        site.id = Some("k57d2hq8v3n9m1p4r6s8t0w2y4a6c8e0".into());
        assert!(site.store_id().is_some());
    }

    #[test]
    fn queued_url_serializes_camel_case() {
        let row = QueuedUrl {
            url: "https://example.com/job/1".into(),
            source_url: "https://example.com/jobs".into(),
            pattern: None,
            provider: ScrapeProvider::Spidercloud,
            status: QueueStatus::Pending,
            attempts: 0,
            created_at: 1,
            updated_at: 1,
            site_id: None,
            error: None,
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["sourceUrl"], "https://example.com/jobs");
        assert_eq!(value["status"], "pending");
        assert!(value.get("pattern").is_none());
    }
}
