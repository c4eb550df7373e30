use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpiderCloudError>;

#[derive(Debug, Error)]
pub enum SpiderCloudError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SpiderCloudError {
    fn from(err: reqwest::Error) -> Self {
        SpiderCloudError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SpiderCloudError {
    fn from(err: serde_json::Error) -> Self {
        SpiderCloudError::Parse(err.to_string())
    }
}
