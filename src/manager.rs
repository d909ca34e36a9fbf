//! Session manager: the one object a front end holds.
//!
//! SYSTEM CONTEXT
//! ==============
//! Built once per page/process session and handed to whatever renders
//! views. Views call [`SessionManager::check_auth`] on load, subscribe to
//! state changes, and issue API calls through [`SessionManager::client`].
//! Dropping the manager tears the session down; nothing here is global.
//!
//! DESIGN
//! ======
//! `login` and `logout` change local state synchronously so the UI reacts
//! immediately. `logout` hands the backend notification to a spawned task;
//! its failure never restores the session.

use std::sync::Arc;

use reqwest::header::{COOKIE, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::bootstrap::SessionBootstrap;
use crate::client::AuthenticatedClient;
use crate::config::ClientConfig;
use crate::credentials::{CookieJarStore, CredentialStore};
use crate::error::ClientError;
use crate::request::RequestDescriptor;
use crate::session::SessionStore;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{Identity, Role, SessionState};

pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";
pub const LOGOUT_PATH: &str = "/logout";

// =============================================================================
// AUTH PAYLOADS
// =============================================================================

#[derive(Debug, Clone, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// The login response is either `{ "user": {...} }` or the bare identity.
#[derive(Deserialize)]
#[serde(untagged)]
enum LoginReply {
    Wrapped { user: Identity },
    Bare(Identity),
}

/// Self-service account creation form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: Role,
}

impl Registration {
    /// Reject forms the backend would refuse, before any network call.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if email or password is blank, or the role is
    /// not self-assignable.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(ClientError::Validation("Email and password are required".into()));
        }
        if !matches!(self.role, Role::Viewer | Role::Editor) {
            return Err(ClientError::Validation("Please select a valid role".into()));
        }
        Ok(())
    }
}

// =============================================================================
// MANAGER
// =============================================================================

pub struct SessionManager {
    credentials: Arc<dyn CredentialStore>,
    session: Arc<SessionStore>,
    client: Arc<AuthenticatedClient>,
    bootstrap: SessionBootstrap,
    check: Mutex<()>,
}

impl SessionManager {
    /// Build a manager talking to the configured backend over HTTP.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the HTTP client cannot be constructed.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let jar = Arc::new(match &config.session_file {
            Some(path) => CookieJarStore::open(path),
            None => CookieJarStore::new(),
        });
        let transport = ReqwestTransport::new(&config, Arc::clone(&jar))?;
        Ok(Self::with_parts(config, Arc::new(transport), jar))
    }

    /// Build a manager over an explicit transport and credential store.
    #[must_use]
    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let session = Arc::new(SessionStore::new());
        let client = Arc::new(AuthenticatedClient::new(
            config,
            transport,
            Arc::clone(&credentials),
            Arc::clone(&session),
        ));
        let bootstrap = SessionBootstrap::new(Arc::clone(&client), Arc::clone(&credentials));
        Self { credentials, session, client, bootstrap, check: Mutex::new(()) }
    }

    #[must_use]
    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.snapshot()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.session.identity()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Resolve the initial identity. Only the first call does any work;
    /// later and concurrent calls return the settled state.
    pub async fn check_auth(&self) -> SessionState {
        let _guard = self.check.lock().await;
        let Some(generation) = self.session.begin_check() else {
            return self.session.snapshot();
        };

        let identity = self.bootstrap.resolve().await;
        self.session.finish_check(generation, identity);

        let state = self.session.snapshot();
        tracing::info!(phase = ?state.phase(), "session check complete");
        state
    }

    /// Adopt an identity the backend has already confirmed.
    pub fn login(&self, identity: Identity) {
        tracing::info!(user = %identity.id, role = %identity.role, "logged in");
        self.credentials.cache_identity(&identity);
        self.session.set_identity(identity);
    }

    /// End the session locally, right now, and notify the backend.
    ///
    /// The notification runs as a spawned task, so it is sent whether or not
    /// the returned handle is awaited. The local state is already anonymous
    /// when this returns and stays so if the notification fails. The cookies
    /// held at logout are sent explicitly so the backend can revoke them even
    /// though the jar has been wiped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn logout(&self) -> JoinHandle<Result<(), ClientError>> {
        let carried = self.credentials.cookie_header();
        self.session.clear();
        self.credentials.clear();
        tracing::info!("logged out");

        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            let mut request = RequestDescriptor::post(LOGOUT_PATH);
            if let Some(value) = carried.and_then(|c| HeaderValue::from_str(&c).ok()) {
                request = request.header(COOKIE, value);
            }
            match client.send(&request).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "logout notification failed");
                    Err(e)
                }
            }
        })
    }

    /// Exchange email and password for a session, then adopt the identity.
    ///
    /// # Errors
    ///
    /// `Validation` for blank input; otherwise whatever `/login` returns.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ClientError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ClientError::Validation("Email and password are required".into()));
        }
        let request = RequestDescriptor::post(LOGIN_PATH).json(&Credentials { email: email.trim(), password })?;
        let identity = match self.client.send_json::<LoginReply>(&request).await? {
            LoginReply::Wrapped { user } | LoginReply::Bare(user) => user,
        };
        self.login(identity.clone());
        Ok(identity)
    }

    /// Create an account. Does not sign in.
    ///
    /// # Errors
    ///
    /// `Validation` for a rejected form; otherwise whatever `/register` returns.
    pub async fn register(&self, form: &Registration) -> Result<(), ClientError> {
        form.validate()?;
        let request = RequestDescriptor::post(REGISTER_PATH).json(form)?;
        self.client.send(&request).await?;
        tracing::info!(email = %form.email, role = %form.role, "account registered");
        Ok(())
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
