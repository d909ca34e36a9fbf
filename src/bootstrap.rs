//! First-load identity resolution.

use std::sync::Arc;

use crate::client::AuthenticatedClient;
use crate::credentials::CredentialStore;
use crate::request::RequestDescriptor;
use crate::types::Identity;

/// Identity probe endpoint.
pub const ME_PATH: &str = "/me";

/// Resolves who the visitor is when a session starts.
///
/// A cached identity is trusted only while a session cookie backs it.
/// Otherwise one `GET /me` is made through the authenticated client, so an
/// expired access token can still be renewed by the shared refresh path.
/// The probe is never retried here.
pub struct SessionBootstrap {
    client: Arc<AuthenticatedClient>,
    credentials: Arc<dyn CredentialStore>,
}

impl SessionBootstrap {
    #[must_use]
    pub fn new(client: Arc<AuthenticatedClient>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self { client, credentials }
    }

    pub async fn resolve(&self) -> Option<Identity> {
        if self.credentials.has_session_marker() {
            if let Some(identity) = self.credentials.cached_identity() {
                tracing::debug!(user = %identity.id, "using cached identity");
                return Some(identity);
            }
        }

        match self.client.send_json::<Identity>(&RequestDescriptor::get(ME_PATH)).await {
            Ok(identity) => {
                self.credentials.cache_identity(&identity);
                tracing::info!(user = %identity.id, role = %identity.role, "identity resolved");
                Some(identity)
            }
            Err(e) => {
                tracing::debug!(error = %e, "no active session");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "bootstrap_test.rs"]
mod tests;
