use thiserror::Error;

/// Error taxonomy shared across the pipeline. Variants carry the retry
/// classification the worker loops act on: configuration and parse
/// failures stop scheduling, transient provider failures are retried by
/// the caller's policy.
#[derive(Error, Debug)]
pub enum JobSignalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Rate limited ({provider}): {message}")]
    RateLimited { provider: String, message: String },

    #[error("Payment required ({provider}): {message}")]
    PaymentRequired { provider: String, message: String },

    #[error("Timeout ({provider}): {message}")]
    Timeout { provider: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl JobSignalError {
    pub fn config(message: impl Into<String>) -> Self {
        JobSignalError::Config(message.into())
    }

    /// Classify a raw provider error message the way the batch scrapers do:
    /// 402/credits exhaust the budget, 429/timeout are transient, the rest
    /// is a non-retryable provider failure.
    pub fn from_provider_message(provider: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("402")
            || lower.contains("payment required")
            || lower.contains("insufficient credits")
        {
            return JobSignalError::PaymentRequired {
                provider: provider.to_string(),
                message,
            };
        }
        if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate") {
            return JobSignalError::RateLimited {
                provider: provider.to_string(),
                message,
            };
        }
        if lower.contains("timeout") || lower.contains("timed out") {
            return JobSignalError::Timeout {
                provider: provider.to_string(),
                message,
            };
        }
        JobSignalError::Provider {
            provider: provider.to_string(),
            message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobSignalError::RateLimited { .. } | JobSignalError::Timeout { .. }
        )
    }

    pub fn is_payment_required(&self) -> bool {
        matches!(self, JobSignalError::PaymentRequired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limits_as_retryable() {
        let err = JobSignalError::from_provider_message("firecrawl", "HTTP 429 too many requests");
        assert!(err.is_retryable());
    }

    #[test]
    fn classifies_payment_required_distinctly() {
        let err =
            JobSignalError::from_provider_message("firecrawl", "insufficient credits to scrape");
        assert!(err.is_payment_required());
        assert!(!err.is_retryable());
    }

    #[test]
    fn config_errors_are_not_retryable() {
        let err = JobSignalError::config("SPIDER_API_KEY env var is required");
        assert!(!err.is_retryable());
    }
}
