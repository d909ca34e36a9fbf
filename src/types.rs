//! Identity and session-state value types.
//!
//! DESIGN
//! ======
//! `Identity` is issued by the backend and replaced wholesale on login or
//! bootstrap; the client never edits it field by field. The backend keys
//! documents with `_id`, so both `_id` and `id` are accepted on input.

use serde::{Deserialize, Serialize};

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!("unknown role '{other}' (expected admin, editor or viewer)")),
        }
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// The authenticated user's role-bearing profile as known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
}

impl Identity {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins and editors may create and publish posts.
    #[must_use]
    pub fn can_edit(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Editor)
    }

    /// Name if set, otherwise the email address.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.email)
    }
}

// =============================================================================
// SESSION STATE
// =============================================================================

/// Coarse lifecycle phase derived from [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Loading,
    Authenticated,
    Anonymous,
}

/// Snapshot of the session as seen by subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub loading: bool,
    /// Set once the first identity check finishes; never reset.
    pub initialized: bool,
    /// Bumped on every identity change. Work started under an older
    /// generation must not apply its result.
    pub generation: u64,
}

impl SessionState {
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.loading {
            SessionPhase::Loading
        } else if self.identity.is_some() {
            SessionPhase::Authenticated
        } else if self.initialized || self.generation > 0 {
            SessionPhase::Anonymous
        } else {
            SessionPhase::Uninitialized
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
