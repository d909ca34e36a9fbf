//! Credential storage: session cookies and the cached identity.
//!
//! ARCHITECTURE
//! ============
//! `CredentialStore` is the I/O boundary the session core talks to. It only
//! reports presence of cookies and never interprets their values.
//! `CookieJarStore` is the concrete store: it is also installed as the
//! reqwest cookie provider, so cookies the backend sets are captured and
//! replayed on every call without the core touching them.
//!
//! PERSISTENCE
//! ===========
//! With a session file configured, every mutation rewrites a small JSON
//! document holding live cookies and the cached identity. Write failures
//! are logged and otherwise ignored; the in-memory state stays
//! authoritative for the running process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use cookie::Cookie;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::Identity;

/// Short-lived access credential cookie.
pub const ACCESS_COOKIE: &str = "token";
/// Long-lived renewal credential cookie.
pub const REFRESH_COOKIE: &str = "refreshToken";

// =============================================================================
// WIPE RULE
// =============================================================================

/// Which cookie names a wipe expires.
#[derive(Debug, Clone, Copy)]
pub struct WipeRule {
    pub exact: &'static [&'static str],
    pub contains: &'static [&'static str],
}

impl WipeRule {
    /// Every cookie that could carry session state.
    pub const SESSION: Self =
        Self { exact: &[ACCESS_COOKIE, REFRESH_COOKIE], contains: &["auth", "session", "token"] };

    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.exact.contains(&name) || self.contains.iter().any(|needle| name.contains(needle))
    }
}

// =============================================================================
// TRAIT
// =============================================================================

pub trait CredentialStore: Send + Sync {
    /// Value of a live cookie, if present.
    fn read(&self, name: &str) -> Option<String>;

    /// Expire every cookie matched by `rule`. Returns how many were expired.
    fn clear_matching(&self, rule: &WipeRule) -> usize;

    /// `Cookie` header value for the currently live cookies.
    fn cookie_header(&self) -> Option<String>;

    fn cached_identity(&self) -> Option<Identity>;

    fn cache_identity(&self, identity: &Identity);

    fn forget_identity(&self);

    /// Remove the cached identity and expire every session cookie.
    fn clear(&self) {
        self.forget_identity();
        let expired = self.clear_matching(&WipeRule::SESSION);
        tracing::debug!(expired, "credential store cleared");
    }

    /// Whether any cookie that could prove a session is present.
    fn has_session_marker(&self) -> bool {
        self.read(ACCESS_COOKIE).is_some() || self.read(REFRESH_COOKIE).is_some()
    }
}

// =============================================================================
// COOKIE JAR STORE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCookie {
    value: String,
    path: String,
    /// Unix seconds; `None` for a session cookie.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

impl StoredCookie {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JarState {
    #[serde(default)]
    cookies: BTreeMap<String, StoredCookie>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity: Option<Identity>,
}

/// Cookie jar plus identity cache for a single backend origin.
///
/// Cookies are keyed by name only; the client talks to one API host.
#[derive(Debug, Default)]
pub struct CookieJarStore {
    inner: Mutex<JarState>,
    file: Option<PathBuf>,
}

impl CookieJarStore {
    /// Empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by `path`, loading whatever a previous run left there.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_state(&path);
        Self { inner: Mutex::new(state), file: Some(path) }
    }

    fn lock(&self) -> MutexGuard<'_, JarState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one parsed cookie. Expired cookies remove any stored cookie of
    /// the same name, which is how both servers and `clear_matching` delete.
    fn apply(state: &mut JarState, cookie: &Cookie<'_>, now: OffsetDateTime) {
        let expires_at = match (cookie.max_age(), cookie.expires_datetime()) {
            (Some(max_age), _) => Some(now.checked_add(max_age).map_or(i64::MAX, OffsetDateTime::unix_timestamp)),
            (None, Some(at)) => Some(at.unix_timestamp()),
            (None, None) => None,
        };
        let stored = StoredCookie {
            value: cookie.value().to_owned(),
            path: cookie.path().unwrap_or("/").to_owned(),
            expires_at,
        };
        if stored.is_live(now.unix_timestamp()) {
            state.cookies.insert(cookie.name().to_owned(), stored);
        } else {
            state.cookies.remove(cookie.name());
        }
    }

    /// Record cookies from raw `Set-Cookie` header values.
    pub fn store_set_cookies<'a>(&self, headers: impl IntoIterator<Item = &'a str>) {
        let now = OffsetDateTime::now_utc();
        let mut state = self.lock();
        let mut changed = false;
        for raw in headers {
            match Cookie::parse(raw.to_owned()) {
                Ok(cookie) => {
                    Self::apply(&mut state, &cookie, now);
                    changed = true;
                }
                Err(e) => tracing::warn!(error = %e, "ignoring malformed Set-Cookie header"),
            }
        }
        if changed {
            self.persist(&state);
        }
    }

    /// Names of all live cookies, sorted.
    #[must_use]
    pub fn cookie_names(&self) -> Vec<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.lock()
            .cookies
            .iter()
            .filter(|(_, c)| c.is_live(now))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn header_for_path(&self, request_path: &str) -> Option<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let state = self.lock();
        let pairs: Vec<String> = state
            .cookies
            .iter()
            .filter(|(_, c)| c.is_live(now) && path_matches(&c.path, request_path))
            .map(|(name, c)| format!("{name}={}", c.value))
            .collect();
        if pairs.is_empty() { None } else { Some(pairs.join("; ")) }
    }

    fn persist(&self, state: &JarState) {
        let Some(path) = &self.file else {
            return;
        };
        let result = serde_json::to_vec_pretty(state)
            .map_err(std::io::Error::other)
            .and_then(|bytes| std::fs::write(path, bytes));
        if let Err(e) = result {
            tracing::warn!(error = %e, path = %path.display(), "failed to persist session file");
        }
    }
}

impl CredentialStore for CookieJarStore {
    fn read(&self, name: &str) -> Option<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.lock()
            .cookies
            .get(name)
            .filter(|c| c.is_live(now))
            .map(|c| c.value.clone())
    }

    fn clear_matching(&self, rule: &WipeRule) -> usize {
        let now = OffsetDateTime::now_utc();
        let mut state = self.lock();
        let names: Vec<String> = state.cookies.keys().filter(|n| rule.matches(n)).cloned().collect();
        for name in &names {
            let tombstone = Cookie::build((name.clone(), ""))
                .path("/")
                .expires(OffsetDateTime::UNIX_EPOCH)
                .build();
            Self::apply(&mut state, &tombstone, now);
        }
        if !names.is_empty() {
            self.persist(&state);
        }
        names.len()
    }

    fn cookie_header(&self) -> Option<String> {
        self.header_for_path("/")
    }

    fn cached_identity(&self) -> Option<Identity> {
        self.lock().identity.clone()
    }

    fn cache_identity(&self, identity: &Identity) {
        let mut state = self.lock();
        state.identity = Some(identity.clone());
        self.persist(&state);
    }

    fn forget_identity(&self) {
        let mut state = self.lock();
        if state.identity.take().is_some() {
            self.persist(&state);
        }
    }
}

impl reqwest::cookie::CookieStore for CookieJarStore {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, _url: &reqwest::Url) {
        let raw: Vec<&str> = cookie_headers.filter_map(|v| v.to_str().ok()).collect();
        if !raw.is_empty() {
            self.store_set_cookies(raw);
        }
    }

    fn cookies(&self, url: &reqwest::Url) -> Option<HeaderValue> {
        self.header_for_path(url.path())
            .and_then(|header| HeaderValue::from_str(&header).ok())
    }
}

/// RFC 6265 path-match: `/` matches everything, otherwise a prefix on a
/// segment boundary.
fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path == "/" || cookie_path == request_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

fn load_state(path: &Path) -> JarState {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(error = %e, path = %path.display(), "session file unreadable, starting empty");
            JarState::default()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => JarState::default(),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "failed to open session file, starting empty");
            JarState::default()
        }
    }
}

#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;
