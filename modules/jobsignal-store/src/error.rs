use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store network error: {0}")]
    Network(String),

    #[error("Store operation {op} failed: {message}")]
    Operation { op: String, message: String },

    #[error("Store parse error: {0}")]
    Parse(String),

    #[error("Store configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Validation failures on the optional `.id` argument of site
    /// complete/fail are tolerated so non-store-managed ids never break a
    /// workflow.
    pub fn is_id_validation(&self) -> bool {
        match self {
            StoreError::Operation { message, .. } => {
                message.contains("ArgumentValidationError") && message.contains(".id")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_validation_errors_are_recognized() {
        let err = StoreError::Operation {
            op: "router:completeSite".into(),
            message: "ArgumentValidationError: Value does not match validator for `.id`".into(),
        };
        assert!(err.is_id_validation());

        let other = StoreError::Operation {
            op: "router:completeSite".into(),
            message: "boom".into(),
        };
        assert!(!other.is_id_validation());
    }
}
