//! Session store: the single owner of the current identity.
//!
//! DESIGN
//! ======
//! State lives in a `tokio::sync::watch` channel so views can subscribe to
//! changes instead of polling. Every identity change bumps a generation
//! counter inside the same critical section, which lets in-flight work
//! (a bootstrap probe, a refresh) detect that the session moved on while it
//! was suspended and discard its result.

use tokio::sync::watch;

use crate::credentials::CredentialStore;
use crate::types::{Identity, SessionPhase, SessionState};

#[derive(Debug)]
pub struct SessionStore {
    state: watch::Sender<SessionState>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { state }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Enter `Loading` for the first identity check.
    ///
    /// Returns the generation the check runs under, or `None` if a check
    /// already completed.
    pub fn begin_check(&self) -> Option<u64> {
        let mut generation = None;
        self.state.send_if_modified(|s| {
            if s.initialized {
                return false;
            }
            s.loading = true;
            generation = Some(s.generation);
            true
        });
        generation
    }

    /// Complete a check started with [`SessionStore::begin_check`].
    ///
    /// If the session changed while the check was suspended (login, logout,
    /// wipe), the resolved identity is stale and only the flags are settled.
    pub fn finish_check(&self, generation: u64, identity: Option<Identity>) {
        self.state.send_modify(|s| {
            s.loading = false;
            s.initialized = true;
            if s.generation == generation {
                s.identity = identity;
                s.generation += 1;
            } else {
                tracing::debug!(started = generation, current = s.generation, "discarding stale identity check");
            }
        });
    }

    /// Replace the identity wholesale. Returns the new generation.
    pub fn set_identity(&self, identity: Identity) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|s| {
            s.identity = Some(identity);
            s.loading = false;
            s.generation += 1;
            generation = s.generation;
        });
        generation
    }

    /// Drop the identity. Returns the new generation.
    pub fn clear(&self) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|s| {
            s.identity = None;
            s.loading = false;
            s.generation += 1;
            generation = s.generation;
        });
        generation
    }

    /// Clear the session and its stored credentials, but only if the session
    /// is still at `generation`. Returns whether the wipe happened.
    pub fn wipe_if_current(&self, generation: u64, credentials: &dyn CredentialStore) -> bool {
        let wiped = self.state.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            s.identity = None;
            s.loading = false;
            s.generation += 1;
            true
        });
        if wiped {
            credentials.clear();
            tracing::info!(generation, "session wiped");
        } else {
            tracing::debug!(generation, "session moved on, skipping wipe");
        }
        wiped
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
