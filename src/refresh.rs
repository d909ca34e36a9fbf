//! Single-flight credential refresh.
//!
//! ARCHITECTURE
//! ============
//! At most one `/refresh` call is in flight per coordinator. The first
//! caller to need a refresh opens a ticket holding a shared future; every
//! caller that arrives while the ticket is open awaits a clone of that same
//! future and receives the same outcome. The first caller to observe the
//! settled outcome removes the ticket so the next expiry starts fresh.
//!
//! Tickets are tagged with the session generation they were opened under.
//! A caller from a newer generation never takes a stale ticket's outcome:
//! it waits for the stale call to settle and then opens its own ticket, so
//! two refresh calls are never on the wire together. A stale outcome never
//! wipes the newer session and is reported as [`Renewal::Superseded`].
//!
//! TRADE-OFFS
//! ==========
//! The shared future is driven by whichever waiter polls it. If every
//! waiter is dropped mid-flight the refresh pauses: the slot still holds
//! the future and `in_flight()` stays true until the next caller resumes it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::config::{ClientConfig, RefreshPolicy};
use crate::credentials::{CredentialStore, REFRESH_COOKIE};
use crate::error::ClientError;
use crate::request::RequestDescriptor;
use crate::session::SessionStore;
use crate::transport::Transport;

pub const REFRESH_PATH: &str = "/refresh";

/// How a refresh settled for the caller that asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    /// The credential was renewed for the session the caller belongs to.
    Renewed,
    /// The session changed while the refresh was in flight. Nothing was
    /// wiped; the caller should retry under the current credentials.
    Superseded,
}

type RefreshOutcome = Result<Renewal, ClientError>;

enum Attach {
    /// Joined or opened a ticket for the current generation.
    Current(Arc<RefreshTicket>),
    /// A ticket from an older generation is still in flight.
    Stale(Arc<RefreshTicket>),
}

struct RefreshTicket {
    generation: u64,
    outcome: Shared<BoxFuture<'static, RefreshOutcome>>,
    waiters: AtomicUsize,
}

/// Everything the detached refresh future needs, cloned out of the coordinator.
#[derive(Clone)]
struct RefreshTask {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    session: Arc<SessionStore>,
    url: String,
    policy: RefreshPolicy,
    timeout: Duration,
}

pub struct RefreshCoordinator {
    task: RefreshTask,
    slot: Mutex<Option<Arc<RefreshTicket>>>,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            task: RefreshTask {
                transport,
                credentials,
                session,
                url: config.endpoint(REFRESH_PATH),
                policy: config.refresh_policy,
                timeout: config.timeouts.refresh(),
            },
            slot: Mutex::new(None),
        }
    }

    /// Renew the session credential, sharing any refresh already in flight.
    ///
    /// # Errors
    ///
    /// Returns `SessionExpired` if the refresh failed or was impossible. The
    /// session has been wiped whenever this error is returned.
    pub async fn obtain(&self) -> Result<Renewal, ClientError> {
        let ticket = loop {
            match self.attach() {
                Attach::Current(ticket) => break ticket,
                Attach::Stale(stale) => {
                    tracing::debug!(generation = stale.generation, "waiting for stale refresh to settle");
                    let _ = stale.outcome.clone().await;
                    self.release(&stale);
                }
            }
        };
        let outcome = ticket.outcome.clone().await;
        self.release(&ticket);

        if outcome == Ok(Renewal::Renewed) && self.task.session.generation() != ticket.generation {
            tracing::info!(generation = ticket.generation, "refresh settled after session changed");
            return Ok(Renewal::Superseded);
        }
        outcome
    }

    /// Whether a refresh is currently outstanding.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<RefreshTicket>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach(&self) -> Attach {
        let mut slot = self.lock();
        let generation = self.task.session.generation();

        if let Some(ticket) = slot.as_ref() {
            if ticket.generation != generation {
                return Attach::Stale(Arc::clone(ticket));
            }
            let waiters = ticket.waiters.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(generation, waiters, "joining in-flight refresh");
            return Attach::Current(Arc::clone(ticket));
        }

        tracing::debug!(generation, "starting refresh");
        let outcome = self.task.clone().run(generation).boxed().shared();
        let ticket = Arc::new(RefreshTicket { generation, outcome, waiters: AtomicUsize::new(1) });
        *slot = Some(Arc::clone(&ticket));
        Attach::Current(ticket)
    }

    fn release(&self, ticket: &Arc<RefreshTicket>) {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|t| Arc::ptr_eq(t, ticket)) {
            tracing::debug!(
                generation = ticket.generation,
                waiters = ticket.waiters.load(Ordering::Relaxed),
                "refresh ticket closed"
            );
            *slot = None;
        }
    }
}

impl RefreshTask {
    async fn run(self, generation: u64) -> RefreshOutcome {
        if self.policy == RefreshPolicy::RequireMarker && self.credentials.read(REFRESH_COOKIE).is_none() {
            tracing::info!("no renewal credential held, skipping refresh");
            return self.fail(generation);
        }

        let request = RequestDescriptor::post(REFRESH_PATH).with_default_headers();
        match tokio::time::timeout(self.timeout, self.transport.execute(&self.url, &request)).await {
            Ok(Ok(response)) if response.is_success() => {
                tracing::info!(status = response.status(), "session refreshed");
                Ok(Renewal::Renewed)
            }
            Ok(Ok(response)) => {
                tracing::warn!(status = response.status(), "refresh rejected");
                self.fail(generation)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "refresh transport failed");
                self.fail(generation)
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "refresh timed out");
                self.fail(generation)
            }
        }
    }

    /// Wipe and expire, unless the session already moved on; a newer
    /// session is not ours to end.
    fn fail(&self, generation: u64) -> RefreshOutcome {
        if self.session.wipe_if_current(generation, self.credentials.as_ref()) {
            Err(ClientError::SessionExpired)
        } else {
            Ok(Renewal::Superseded)
        }
    }
}

#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;
