//! Errors returned by remote store gateways.

/// Failure talking to the remote store.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Not authorized: {message}")]
    Unauthorized { message: String },
    #[error("Store rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl GatewayError {
    /// True when the store refused the caller rather than the request failing.
    pub fn is_authorization(&self) -> bool {
        matches!(self, GatewayError::Unauthorized { .. })
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        GatewayError::Rejected {
            status: 404,
            message: what.into(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unauthorized_counts_as_authorization() {
        let denied = GatewayError::Unauthorized {
            message: "row-level security".to_string(),
        };
        assert!(denied.is_authorization());
        assert!(!GatewayError::not_found("task").is_authorization());
        assert_eq!(
            GatewayError::not_found("task 1").to_string(),
            "Store rejected request (HTTP 404): task 1"
        );
    }
}
