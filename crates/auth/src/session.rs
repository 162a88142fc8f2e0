//! Local mirror of the identity provider's session and principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wholesail_core::PrincipalId;

use crate::profile::Role;

/// Provider-supplied metadata attached to a principal at sign-up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrincipalMetadata {
    pub full_name: Option<String>,
    /// Role the user asked for during registration, if any.
    pub requested_role: Option<Role>,
}

/// The authenticated identity tied to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub metadata: PrincipalMetadata,
}

impl Principal {
    /// Display name for a freshly provisioned profile: the provider-supplied
    /// full name, else the mailbox part of the email, else a generic label.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.metadata.full_name.as_deref() {
            let name = name.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
        match self.email.split('@').next() {
            Some(local) if !local.is_empty() => local.to_string(),
            _ => "New member".to_string(),
        }
    }
}

/// Provider-issued, time-bounded credential.
///
/// Owned by the identity provider; this subsystem only holds a read mirror
/// and never refreshes or invalidates it locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub principal: Principal,
}

/// Kind of session lifecycle event emitted by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    PrincipalUpdated,
}

/// Session-change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionChange {
    pub kind: SessionEventKind,
    pub session: Option<Session>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(email: &str, full_name: Option<&str>) -> Principal {
        Principal {
            id: PrincipalId::new(),
            email: email.to_string(),
            metadata: PrincipalMetadata {
                full_name: full_name.map(str::to_string),
                requested_role: None,
            },
        }
    }

    #[test]
    fn display_name_prefers_metadata() {
        let p = principal("maria@acme.test", Some("Maria Lund"));
        assert_eq!(p.display_name(), "Maria Lund");
    }

    #[test]
    fn display_name_falls_back_to_mailbox() {
        let p = principal("maria@acme.test", None);
        assert_eq!(p.display_name(), "maria");

        let blank = principal("maria@acme.test", Some("   "));
        assert_eq!(blank.display_name(), "maria");
    }

    #[test]
    fn display_name_generic_when_nothing_usable() {
        let p = principal("@acme.test", None);
        assert_eq!(p.display_name(), "New member");
    }
}
