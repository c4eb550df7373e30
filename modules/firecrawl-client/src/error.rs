use thiserror::Error;

pub type Result<T> = std::result::Result<T, FirecrawlError>;

#[derive(Debug, Error)]
pub enum FirecrawlError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl FirecrawlError {
    /// Map an HTTP status + body to the variant the retry policy cares
    /// about: 402 is a quota problem, 429 is transient.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            402 => FirecrawlError::PaymentRequired(message),
            429 => FirecrawlError::RateLimited(message),
            408 | 504 => FirecrawlError::Timeout(message),
            _ => FirecrawlError::Api { status, message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FirecrawlError::RateLimited(_) | FirecrawlError::Timeout(_)
        )
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            FirecrawlError::Api { status, .. } => Some(*status),
            FirecrawlError::PaymentRequired(_) => Some(402),
            FirecrawlError::RateLimited(_) => Some(429),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FirecrawlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FirecrawlError::Timeout(err.to_string())
        } else {
            FirecrawlError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FirecrawlError {
    fn from(err: serde_json::Error) -> Self {
        FirecrawlError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_retry_policy() {
        assert!(matches!(
            FirecrawlError::from_status(402, "no credits".into()),
            FirecrawlError::PaymentRequired(_)
        ));
        assert!(FirecrawlError::from_status(429, "slow down".into()).is_retryable());
        assert!(!FirecrawlError::from_status(500, "boom".into()).is_retryable());
    }
}
