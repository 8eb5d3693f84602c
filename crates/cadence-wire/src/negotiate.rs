//! SDP offer/answer exchange with the realtime endpoint

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Default negotiation endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/realtime";

/// Exchanges a local session offer for the server's answer
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Send `offer_sdp` for `model` and return the answer SDP
    async fn negotiate(&self, offer_sdp: &str, model: &str) -> Result<String>;
}

/// Negotiator that POSTs the offer to an HTTP endpoint
pub struct HttpNegotiator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpNegotiator {
    /// Create a negotiator for `base_url` authenticating with `api_key`
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Create from the `OPENAI_API_KEY` environment variable
    pub fn from_env(base_url: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| Error::InvalidApiKey)?;
        Ok(Self::new(base_url, api_key))
    }

    /// Endpoint the offer is posted to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Negotiator for HttpNegotiator {
    async fn negotiate(&self, offer_sdp: &str, model: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(Error::InvalidApiKey);
        }

        tracing::debug!("Posting SDP offer to {} for model {}", self.base_url, model);

        let response = self
            .client
            .post(&self.base_url)
            .query(&[("model", model)])
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::negotiation(status.as_u16(), body));
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one request with a canned raw HTTP response, returning the
    /// endpoint URL.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            // Read headers, then the declared body.
            let body_start = loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                if n == 0 {
                    return;
                }
            };
            let headers = String::from_utf8_lossy(&request[..body_start]).to_lowercase();
            let length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            while request.len() < body_start + length {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/v1/realtime", addr)
    }

    #[tokio::test]
    async fn test_answer_returned_on_success() {
        let url = serve_once("HTTP/1.1 201 Created\r\nContent-Length: 10\r\n\r\nv=0 answer").await;
        let negotiator = HttpNegotiator::new(url, "key");
        let answer = negotiator.negotiate("v=0 offer", "model").await.unwrap();
        assert_eq!(answer, "v=0 answer");
    }

    #[tokio::test]
    async fn test_truncated_answer_is_an_error() {
        let url = serve_once("HTTP/1.1 201 Created\r\nContent-Length: 100\r\n\r\nabc").await;
        let negotiator = HttpNegotiator::new(url, "key");
        let err = negotiator.negotiate("v=0 offer", "model").await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }

    #[tokio::test]
    async fn test_rejected_offer_keeps_status_and_body() {
        let url =
            serve_once("HTTP/1.1 401 Unauthorized\r\nContent-Length: 7\r\n\r\nbad key").await;
        let negotiator = HttpNegotiator::new(url, "key");
        let err = negotiator.negotiate("v=0 offer", "model").await.unwrap_err();
        assert!(err.is_auth());
        assert!(matches!(
            err,
            Error::Negotiation { status: 401, ref body } if body == "bad key"
        ));
    }

    #[tokio::test]
    async fn test_empty_key_rejected_before_request() {
        let negotiator = HttpNegotiator::new("http://127.0.0.1:9", "");
        let err = negotiator.negotiate("v=0", "model").await.unwrap_err();
        assert!(matches!(err, Error::InvalidApiKey));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        // Port 9 (discard) on loopback is not expected to accept connections.
        let negotiator = HttpNegotiator::new("http://127.0.0.1:9/v1/realtime", "key");
        let err = negotiator.negotiate("v=0", "model").await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        assert!(err.is_retryable());
    }
}
