//! Authenticated request client.
//!
//! DESIGN
//! ======
//! Every API call goes through [`AuthenticatedClient::send`]. Cookies ride
//! along via the transport's cookie jar, JSON is the default content type,
//! and responses are classified into the [`ClientError`] taxonomy.
//!
//! A 401 from an ordinary endpoint triggers one shared refresh and exactly
//! one replay of the original descriptor. If the session changed while the
//! request or its refresh was in flight, the replay runs under the current
//! credentials and `SessionExpired` is not reported. Auth endpoints are excluded so a
//! rejected login or refresh can never recurse into another refresh.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::{ClientError, error_message};
use crate::refresh::{RefreshCoordinator, Renewal};
use crate::request::{ApiResponse, RequestDescriptor, url_path};
use crate::session::SessionStore;
use crate::transport::Transport;

/// Path fragments identifying endpoints that issue or revoke credentials.
pub const AUTH_ENDPOINTS: [&str; 4] = ["/login", "/register", "/refresh", "/logout"];

const UNAUTHORIZED: u16 = 401;

/// Whether `url` addresses an endpoint that must bypass refresh-and-retry.
#[must_use]
pub fn is_auth_endpoint(url: &str) -> bool {
    let path = url_path(url);
    AUTH_ENDPOINTS.iter().any(|fragment| path.contains(fragment))
}

pub struct AuthenticatedClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    refresh: RefreshCoordinator,
}

impl AuthenticatedClient {
    #[must_use]
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        session: Arc<SessionStore>,
    ) -> Self {
        let refresh = RefreshCoordinator::new(&config, Arc::clone(&transport), credentials, Arc::clone(&session));
        Self { config, transport, session, refresh }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// Send `descriptor`, refreshing the session and replaying once on 401.
    ///
    /// # Errors
    ///
    /// - `NetworkUnavailable` if no response arrived.
    /// - `SessionExpired` if a refresh was needed and failed.
    /// - `RequestFailed` for any other non-2xx outcome, including a 401 on
    ///   the replay.
    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse, ClientError> {
        let generation = self.session.generation();
        let response = self.dispatch(descriptor).await?;

        if response.status() != UNAUTHORIZED || is_auth_endpoint(descriptor.url()) {
            return classify(response);
        }

        // A login or logout landed while this request or its refresh was in
        // flight; the rejected credential is gone, so replay under the
        // current one.
        let renewal = if self.session.generation() == generation {
            tracing::debug!(url = descriptor.url(), "credential rejected, refreshing");
            self.refresh.obtain().await?
        } else {
            Renewal::Superseded
        };
        if renewal == Renewal::Superseded {
            tracing::debug!(url = descriptor.url(), "credential rejected by a previous session, replaying");
        }

        let retried = self.dispatch(descriptor).await?;
        if retried.status() == UNAUTHORIZED {
            tracing::warn!(url = descriptor.url(), "still unauthorized after refresh");
        }
        classify(retried)
    }

    /// Send and decode a JSON body.
    ///
    /// # Errors
    ///
    /// As [`AuthenticatedClient::send`], plus `InvalidBody` if decoding fails.
    pub async fn send_json<T: DeserializeOwned>(&self, descriptor: &RequestDescriptor) -> Result<T, ClientError> {
        self.send(descriptor).await?.json()
    }

    /// `GET` a path and decode the JSON body.
    ///
    /// # Errors
    ///
    /// As [`AuthenticatedClient::send_json`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send_json(&RequestDescriptor::get(path)).await
    }

    async fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse, ClientError> {
        let url = self.config.endpoint(descriptor.url());
        let request = descriptor.with_default_headers();
        let response = self.transport.execute(&url, &request).await.map_err(|e| {
            tracing::warn!(error = %e, %url, "backend unreachable");
            ClientError::from(e)
        })?;
        tracing::debug!(status = response.status(), method = %descriptor.method(), %url, "request completed");
        Ok(response)
    }
}

fn classify(response: ApiResponse) -> Result<ApiResponse, ClientError> {
    if response.is_success() {
        return Ok(response);
    }
    let status = response.status();
    Err(ClientError::RequestFailed { status, message: error_message(status, response.text()) })
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
