//! HTTP transport seam.
//!
//! The session core only needs "send this, give me status and body".
//! `ReqwestTransport` is the production implementation; tests substitute a
//! scripted transport behind the same trait.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::credentials::CookieJarStore;
use crate::error::ClientError;
use crate::request::{ApiResponse, RequestDescriptor};

/// No response was received at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport failed: {0}")]
pub struct TransportError(pub String);

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        Self::NetworkUnavailable { detail: e.0 }
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` to the absolute `url`. Any HTTP status is a success
    /// at this layer; only a missing response is an error.
    async fn execute(&self, url: &str, request: &RequestDescriptor) -> Result<ApiResponse, TransportError>;
}

// =============================================================================
// REQWEST
// =============================================================================

pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client whose cookie jar is `cookies`.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the TLS backend fails to initialize.
    pub fn new(config: &ClientConfig, cookies: Arc<CookieJarStore>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeouts.request())
            .connect_timeout(config.timeouts.connect())
            .cookie_provider(cookies)
            .build()
            .map_err(|e| ClientError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, url: &str, request: &RequestDescriptor) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .http
            .request(request.method().clone(), url)
            .headers(request.headers().clone());
        if let Some(body) = request.body_text() {
            builder = builder.body(body.to_owned());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        tracing::trace!(status, %url, method = %request.method(), "response received");
        Ok(ApiResponse::new(status, body))
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
