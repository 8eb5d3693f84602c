//! Error types for cadence-wire

use thiserror::Error;

/// Result type alias using cadence-wire Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when encoding events or negotiating a session
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The negotiation endpoint rejected the offer
    #[error("Negotiation failed with status {status}: {body}")]
    Negotiation { status: u16, body: String },

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Inbound message is not a JSON object with a string `type` field
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
}

impl Error {
    /// Create a negotiation error from a status code and response body
    pub fn negotiation(status: u16, body: impl Into<String>) -> Self {
        Self::Negotiation {
            status,
            body: body.into(),
        }
    }

    /// Check if this error is an authentication problem
    pub fn is_auth(&self) -> bool {
        match self {
            Error::InvalidApiKey => true,
            Error::Negotiation { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    /// Check if retrying the same request could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) => true,
            Error::Negotiation { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
