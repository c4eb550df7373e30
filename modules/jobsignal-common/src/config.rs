use std::env;
use std::path::{Path, PathBuf};

use serde_json::Value;

/// Application configuration loaded from environment variables.
///
/// Provider keys are optional — a missing key disables that provider and
/// surfaces as a non-retryable configuration error only when a site
/// explicitly requires it.
#[derive(Debug, Clone, Default)]
pub struct Config {
    // Remote store (named-operation API)
    pub convex_url: String,
    pub convex_http_url: String,

    // Crawler providers
    pub spider_api_key: String,
    pub firecrawl_api_key: String,
    pub fetchfox_api_key: String,

    // Worker identity
    pub worker_id: String,
}

impl Config {
    /// Load worker configuration from environment variables.
    pub fn from_env() -> Self {
        let convex_url = env::var("CONVEX_URL").unwrap_or_default();
        let convex_http_url = env::var("CONVEX_HTTP_URL").unwrap_or_default();
        Self {
            convex_url,
            convex_http_url,
            spider_api_key: env::var("SPIDER_API_KEY")
                .or_else(|_| env::var("SPIDER_KEY"))
                .unwrap_or_default(),
            firecrawl_api_key: env::var("FIRECRAWL_API_KEY").unwrap_or_default(),
            fetchfox_api_key: env::var("FETCHFOX_API_KEY").unwrap_or_default(),
            worker_id: env::var("WORKER_ID").unwrap_or_default(),
        }
    }

    /// Deployment URL for the store client. Webhook-ingress hosts are
    /// folded back to the deployment domain.
    pub fn store_deployment_url(&self) -> Option<String> {
        if !self.convex_url.is_empty() {
            return Some(self.convex_url.trim_end_matches('/').to_string());
        }
        if !self.convex_http_url.is_empty() {
            let url = self.convex_http_url.trim_end_matches('/');
            return Some(url.replace(".convex.site", ".convex.cloud"));
        }
        None
    }

    /// HTTP base the batch-async provider posts webhooks to. The ingress
    /// lives on the `.convex.site` domain.
    pub fn webhook_http_base(&self) -> Option<String> {
        let base = if !self.convex_http_url.is_empty() {
            self.convex_http_url.trim_end_matches('/').to_string()
        } else if !self.convex_url.is_empty() {
            self.convex_url
                .trim_end_matches('/')
                .replace(".convex.cloud", ".convex.site")
        } else {
            return None;
        };
        if base.contains(".convex.cloud") {
            return Some(base.replace(".convex.cloud", ".convex.site"));
        }
        Some(base)
    }

    /// Log key presence without echoing secrets.
    pub fn log_redacted(&self) {
        let vars = [
            ("CONVEX_URL", &self.convex_url),
            ("CONVEX_HTTP_URL", &self.convex_http_url),
            ("SPIDER_API_KEY", &self.spider_api_key),
            ("FIRECRAWL_API_KEY", &self.firecrawl_api_key),
            ("FETCHFOX_API_KEY", &self.fetchfox_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

/// Tunables loaded from `runtime.yaml`. Every field is integer-coerced
/// with a fixed default so a missing or malformed file never stops a
/// worker from booting.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub spidercloud_job_details_timeout_minutes: u64,
    pub spidercloud_job_details_batch_size: usize,
    pub spidercloud_job_details_concurrency: usize,
    pub spidercloud_job_details_processing_expire_minutes: u64,
    pub spidercloud_http_timeout_seconds: u64,
    pub general_worker_count: usize,
    pub job_details_worker_count: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            spidercloud_job_details_timeout_minutes: 15,
            spidercloud_job_details_batch_size: 50,
            spidercloud_job_details_concurrency: 4,
            spidercloud_job_details_processing_expire_minutes: 20,
            spidercloud_http_timeout_seconds: 900,
            general_worker_count: 4,
            job_details_worker_count: 4,
        }
    }
}

impl RuntimeConfig {
    pub fn load() -> Self {
        Self::from_path(&resolve_config_path("runtime.yaml"))
    }

    pub fn from_path(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Self {
        let data: Value = match serde_yaml::from_str(raw) {
            Ok(value) => value,
            Err(_) => return Self::default(),
        };
        let defaults = Self::default();
        Self {
            spidercloud_job_details_timeout_minutes: coerce_u64(
                &data,
                "spidercloud_job_details_timeout_minutes",
                defaults.spidercloud_job_details_timeout_minutes,
            ),
            spidercloud_job_details_batch_size: coerce_u64(
                &data,
                "spidercloud_job_details_batch_size",
                defaults.spidercloud_job_details_batch_size as u64,
            ) as usize,
            spidercloud_job_details_concurrency: coerce_u64(
                &data,
                "spidercloud_job_details_concurrency",
                defaults.spidercloud_job_details_concurrency as u64,
            ) as usize,
            spidercloud_job_details_processing_expire_minutes: coerce_u64(
                &data,
                "spidercloud_job_details_processing_expire_minutes",
                defaults.spidercloud_job_details_processing_expire_minutes,
            ),
            spidercloud_http_timeout_seconds: coerce_u64(
                &data,
                "spidercloud_http_timeout_seconds",
                defaults.spidercloud_http_timeout_seconds,
            ),
            general_worker_count: coerce_u64(
                &data,
                "general_worker_count",
                defaults.general_worker_count as u64,
            ) as usize,
            job_details_worker_count: coerce_u64(
                &data,
                "job_details_worker_count",
                defaults.job_details_worker_count as u64,
            ) as usize,
        }
    }

    pub fn processing_expiry_ms(&self) -> i64 {
        (self.spidercloud_job_details_processing_expire_minutes * 60 * 1000) as i64
    }
}

fn coerce_u64(data: &Value, key: &str, default: u64) -> u64 {
    match data.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f as u64))
            .unwrap_or(default),
        _ => default,
    }
}

/// Config files live next to the process by default; `JOBSIGNAL_CONFIG_DIR`
/// overrides for deployments that mount configs elsewhere.
pub fn resolve_config_path(name: &str) -> PathBuf {
    if let Ok(dir) = env::var("JOBSIGNAL_CONFIG_DIR") {
        return PathBuf::from(dir).join(name);
    }
    PathBuf::from("config").join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_defaults_when_yaml_missing() {
        let cfg = RuntimeConfig::from_path(Path::new("/nonexistent/runtime.yaml"));
        assert_eq!(cfg.spidercloud_job_details_timeout_minutes, 15);
        assert_eq!(cfg.spidercloud_job_details_batch_size, 50);
        assert_eq!(cfg.spidercloud_job_details_concurrency, 4);
        assert_eq!(cfg.spidercloud_job_details_processing_expire_minutes, 20);
        assert_eq!(cfg.spidercloud_http_timeout_seconds, 900);
        assert_eq!(cfg.general_worker_count, 4);
        assert_eq!(cfg.job_details_worker_count, 4);
    }

    #[test]
    fn runtime_overrides_are_integer_coerced() {
        let cfg = RuntimeConfig::from_yaml_str(
            "spidercloud_job_details_batch_size: 25\nspidercloud_http_timeout_seconds: 30.0\nunrelated: yes\n",
        );
        assert_eq!(cfg.spidercloud_job_details_batch_size, 25);
        assert_eq!(cfg.spidercloud_http_timeout_seconds, 30);
        // untouched keys keep defaults
        assert_eq!(cfg.general_worker_count, 4);
    }

    #[test]
    fn runtime_malformed_yaml_falls_back_to_defaults() {
        let cfg = RuntimeConfig::from_yaml_str(": not yaml :::");
        assert_eq!(cfg.spidercloud_job_details_batch_size, 50);
    }

    #[test]
    fn processing_expiry_is_in_milliseconds() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.processing_expiry_ms(), 20 * 60 * 1000);
    }

    #[test]
    fn webhook_base_prefers_site_domain() {
        let config = Config {
            convex_url: "https://happy-otter-123.convex.cloud".into(),
            ..Config::default()
        };
        assert_eq!(
            config.webhook_http_base().as_deref(),
            Some("https://happy-otter-123.convex.site")
        );
        assert_eq!(
            config.store_deployment_url().as_deref(),
            Some("https://happy-otter-123.convex.cloud")
        );
    }
}
