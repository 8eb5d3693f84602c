//! Session configuration

use std::time::Duration;

use cadence_wire::HttpNegotiator;
use serde::{Deserialize, Serialize};

/// Default time between recorded-audio notifications
pub const DEFAULT_CHUNK_DURATION: Duration = Duration::from_millis(1000);

/// Default realtime model
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// Configuration accepted when constructing a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Time between capture chunks (and so between audio-buffer notifications)
    #[serde(with = "millis")]
    pub chunk_duration: Duration,
    /// Target model identifier sent during negotiation
    pub model: String,
    /// Negotiation endpoint base address. Read by [`SessionConfig::http_negotiator`];
    /// sessions built with another [`cadence_wire::Negotiator`] ignore it.
    pub base_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_duration: DEFAULT_CHUNK_DURATION,
            model: DEFAULT_MODEL.to_string(),
            base_url: cadence_wire::negotiate::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl SessionConfig {
    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the negotiation endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the capture chunk duration
    pub fn with_chunk_duration(mut self, chunk_duration: Duration) -> Self {
        self.chunk_duration = chunk_duration;
        self
    }

    /// HTTP negotiator posting offers to `base_url`
    pub fn http_negotiator(&self, api_key: impl Into<String>) -> HttpNegotiator {
        HttpNegotiator::new(self.base_url.as_str(), api_key)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
