//! Client-side session and authenticated-request core for the CMS API.
//!
//! ARCHITECTURE
//! ============
//! - [`credentials`]: cookie jar and cached identity behind `CredentialStore`.
//! - [`session`]: the observable session state and its generation counter.
//! - [`refresh`]: single-flight credential renewal.
//! - [`client`]: every API call, with one refresh-and-replay on 401.
//! - [`bootstrap`]: first-load identity resolution.
//! - [`manager`]: the injectable facade a front end holds.
//! - [`api`]: typed post and user endpoints.

pub mod api;
pub mod bootstrap;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod refresh;
pub mod request;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use client::AuthenticatedClient;
pub use config::{ClientConfig, RefreshPolicy};
pub use credentials::{CookieJarStore, CredentialStore};
pub use error::{ClientError, ErrorCode};
pub use manager::{Registration, SessionManager};
pub use request::{ApiResponse, RequestDescriptor};
pub use types::{Identity, Role, SessionPhase, SessionState};
