//! Scripted transport and fixtures shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Method;

use crate::config::ClientConfig;
use crate::credentials::CookieJarStore;
use crate::request::{ApiResponse, RequestDescriptor};
use crate::transport::{Transport, TransportError};
use crate::types::{Identity, Role};

pub const BASE_URL: &str = "http://api.test";

#[derive(Debug, Clone)]
pub enum MockReply {
    Status { status: u16, body: String, set_cookies: Vec<String> },
    Unreachable,
}

impl MockReply {
    pub fn status(status: u16, body: &str) -> Self {
        Self::Status { status, body: body.to_owned(), set_cookies: Vec::new() }
    }

    pub fn with_cookie(mut self, cookie: &str) -> Self {
        if let Self::Status { set_cookies, .. } = &mut self {
            set_cookies.push(cookie.to_owned());
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub cookie: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

/// Transport that answers from per-path reply queues. The last reply in a
/// queue repeats. Unscripted paths answer 404. Every call yields once so
/// concurrent callers interleave the way they would on real I/O.
pub struct MockTransport {
    jar: Arc<CookieJarStore>,
    routes: Mutex<HashMap<String, VecDeque<MockReply>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<RecordedCall>>,
    /// Per path: (calls currently outstanding, most ever outstanding at once).
    outstanding: Mutex<HashMap<String, (usize, usize)>>,
}

impl MockTransport {
    pub fn new(jar: Arc<CookieJarStore>) -> Self {
        Self {
            jar,
            routes: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            outstanding: Mutex::new(HashMap::new()),
        }
    }

    pub fn script(&self, path: &str, replies: Vec<MockReply>) -> &Self {
        self.routes.lock().unwrap().insert(path.to_owned(), replies.into());
        self
    }

    pub fn reply(&self, path: &str, status: u16, body: &str) -> &Self {
        self.script(path, vec![MockReply::status(status, body)])
    }

    pub fn delay(&self, path: &str, delay: Duration) -> &Self {
        self.delays.lock().unwrap().insert(path.to_owned(), delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.path == path).count()
    }

    /// Most calls to `path` that were ever awaiting a reply at the same time.
    pub fn peak_concurrency(&self, path: &str) -> usize {
        self.outstanding.lock().unwrap().get(path).map_or(0, |(_, peak)| *peak)
    }

    fn enter(&self, path: &str) {
        let mut outstanding = self.outstanding.lock().unwrap();
        let (now, peak) = outstanding.entry(path.to_owned()).or_default();
        *now += 1;
        *peak = (*peak).max(*now);
    }

    fn leave(&self, path: &str) {
        if let Some((now, _)) = self.outstanding.lock().unwrap().get_mut(path) {
            *now -= 1;
        }
    }

    fn next_reply(&self, path: &str) -> MockReply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| MockReply::status(404, "")),
            None => MockReply::status(404, ""),
        }
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn execute(&self, url: &str, request: &RequestDescriptor) -> Result<ApiResponse, TransportError> {
        let path = reqwest::Url::parse(url).unwrap().path().to_owned();
        let explicit_cookie = request
            .headers()
            .get(reqwest::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method().clone(),
            path: path.clone(),
            cookie: explicit_cookie.or_else(|| crate::credentials::CredentialStore::cookie_header(&*self.jar)),
            content_type: request
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            body: request.body_text().map(str::to_owned),
        });

        self.enter(&path);
        tokio::task::yield_now().await;
        let delay = self.delays.lock().unwrap().get(&path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.leave(&path);

        match self.next_reply(&path) {
            MockReply::Status { status, body, set_cookies } => {
                self.jar.store_set_cookies(set_cookies.iter().map(String::as_str));
                Ok(ApiResponse::new(status, body))
            }
            MockReply::Unreachable => Err(TransportError("connection refused".into())),
        }
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig::new(BASE_URL)
}

pub fn alice() -> Identity {
    Identity { id: "u1".into(), name: Some("Alice".into()), email: "alice@example.com".into(), role: Role::Admin }
}

pub fn identity_json(identity: &Identity) -> String {
    serde_json::to_string(identity).unwrap()
}
