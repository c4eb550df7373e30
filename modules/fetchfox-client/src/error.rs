use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchFoxError>;

#[derive(Debug, Error)]
pub enum FetchFoxError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FetchFoxError {
    fn from(err: reqwest::Error) -> Self {
        FetchFoxError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for FetchFoxError {
    fn from(err: serde_json::Error) -> Self {
        FetchFoxError::Parse(err.to_string())
    }
}
