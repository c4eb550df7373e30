pub mod config;
pub mod error;
pub mod filters;
pub mod types;

pub use config::{Config, RuntimeConfig};
pub use error::JobSignalError;
pub use filters::{FilterSettings, RemoteCompanies};
pub use types::{
    HeuristicConfig, HeuristicField, IgnoredJob, IgnoredReason, JobInput, JobLevel,
    PendingJobDetail, QueueStatus, QueuedUrl, ScrapeProvider, Site, SiteType, WebhookEventRow,
    looks_like_store_id, now_ms,
};
