//! Transport — one HTTP exchange with the control plane
//!
//! JSON in, raw body out, bounded timeouts. The transport knows nothing about
//! breaker state; callers decide what a failure means.

use serde::Serialize;

use crate::config::{defaults, WebServerConfig};
use crate::types::RemoteEndpoint;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server answered outside `[200, 300)`.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// Connection refused, DNS failure, timeout, or a truncated body.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("request body could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("HTTP client could not be built: {0}")]
    Client(#[source] reqwest::Error),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Network(e) if e.is_timeout())
    }
}

/// Successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP client bound to one control-plane endpoint.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    endpoint: RemoteEndpoint,
}

impl Transport {
    /// Build a transport with the configured request/connect timeouts.
    pub fn new(endpoint: RemoteEndpoint, settings: &WebServerConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.connect_timeout())
            .user_agent(format!(
                "{}/{}",
                defaults::USER_AGENT_PRODUCT,
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    /// POST `body` as JSON to `path`.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<RawResponse, TransportError> {
        let payload = serde_json::to_vec(body)?;

        let request = self
            .http
            .post(self.endpoint.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(defaults::SERVER_CODE_HEADER, self.endpoint.server_code())
            .body(payload);

        Self::exchange(request).await
    }

    /// GET `path` with the given query pairs.
    pub async fn fetch(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<RawResponse, TransportError> {
        let request = self
            .http
            .get(self.endpoint.url(path))
            .query(query)
            .header(defaults::SERVER_CODE_HEADER, self.endpoint.server_code());

        Self::exchange(request).await
    }

    async fn exchange(request: reqwest::RequestBuilder) -> Result<RawResponse, TransportError> {
        let resp = request.send().await.map_err(TransportError::Network)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(TransportError::Network)?;

        if (200..300).contains(&status) {
            Ok(RawResponse { status, body })
        } else {
            Err(TransportError::Status { status, body })
        }
    }
}
