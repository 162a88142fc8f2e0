//! In-memory identity provider.
//!
//! Intended for tests/dev. Sessions never expire on their own; lifecycle
//! events are broadcast exactly the way a hosted provider would push them.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use wholesail_auth::{
    IdentityProvider, Principal, PrincipalMetadata, ProviderError, Session, SessionChange,
    SessionEventKind,
};
use wholesail_core::PrincipalId;

#[derive(Debug, Clone)]
struct Account {
    id: PrincipalId,
    password: String,
    metadata: PrincipalMetadata,
}

/// In-memory [`IdentityProvider`].
pub struct InMemoryIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    session: RwLock<Option<Session>>,
    codes: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<SessionChange>,
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            accounts: RwLock::new(HashMap::new()),
            session: RwLock::new(None),
            codes: RwLock::new(HashMap::new()),
            events,
        }
    }
}

fn poisoned(_: impl core::fmt::Debug) -> ProviderError {
    ProviderError::Unavailable("lock poisoned".to_string())
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account without signing it in or emitting events.
    /// Backdoor for tests that need "account exists, no profile row yet".
    pub fn seed_account(
        &self,
        email: &str,
        password: &str,
        metadata: PrincipalMetadata,
    ) -> PrincipalId {
        let id = PrincipalId::new();
        self.accounts
            .write()
            .expect("account table lock")
            .insert(
                email.to_string(),
                Account {
                    id,
                    password: password.to_string(),
                    metadata,
                },
            );
        id
    }

    /// Stage a one-time code for an email (confirmation / recovery mail).
    pub fn issue_code(&self, email: &str, code: &str) {
        self.codes
            .write()
            .expect("code table lock")
            .insert(email.to_string(), code.to_string());
    }

    /// Push a crafted lifecycle event to all subscribers.
    pub fn emit(&self, change: SessionChange) {
        let _ = self.events.send(change);
    }

    fn issue_session(&self, email: &str, account: &Account) -> Session {
        Session {
            access_token: Uuid::now_v7().to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            principal: Principal {
                id: account.id,
                email: email.to_string(),
                metadata: account.metadata.clone(),
            },
        }
    }

    fn install_session(&self, session: Session) -> Result<(), ProviderError> {
        *self.session.write().map_err(poisoned)? = Some(session.clone());
        let _ = self.events.send(SessionChange {
            kind: SessionEventKind::SignedIn,
            session: Some(session),
        });
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: PrincipalMetadata,
    ) -> Result<Session, ProviderError> {
        let session = {
            let mut accounts = self.accounts.write().map_err(poisoned)?;
            if accounts.contains_key(email) {
                return Err(ProviderError::EmailTaken);
            }
            let account = Account {
                id: PrincipalId::new(),
                password: password.to_string(),
                metadata,
            };
            let session = self.issue_session(email, &account);
            accounts.insert(email.to_string(), account);
            session
        };
        self.install_session(session.clone())?;
        Ok(session)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let session = {
            let accounts = self.accounts.read().map_err(poisoned)?;
            let account = accounts
                .get(email)
                .filter(|a| a.password == password)
                .ok_or(ProviderError::InvalidCredentials)?;
            self.issue_session(email, account)
        };
        self.install_session(session.clone())?;
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.session.write().map_err(poisoned)?.take();
        let _ = self.events.send(SessionChange {
            kind: SessionEventKind::SignedOut,
            session: None,
        });
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        Ok(self.session.read().map_err(poisoned)?.clone())
    }

    async fn verify_one_time_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Session, ProviderError> {
        {
            let mut codes = self.codes.write().map_err(poisoned)?;
            match codes.get(email) {
                Some(staged) if staged == code => {
                    codes.remove(email);
                }
                _ => return Err(ProviderError::InvalidCode),
            }
        }
        let session = {
            let accounts = self.accounts.read().map_err(poisoned)?;
            let account = accounts.get(email).ok_or(ProviderError::InvalidCode)?;
            self.issue_session(email, account)
        };
        self.install_session(session.clone())?;
        Ok(session)
    }

    async fn update_credential(&self, new_password: &str) -> Result<(), ProviderError> {
        let email = {
            let session = self.session.read().map_err(poisoned)?;
            session
                .as_ref()
                .map(|s| s.principal.email.clone())
                .ok_or(ProviderError::SessionExpired)?
        };
        let mut accounts = self.accounts.write().map_err(poisoned)?;
        let account = accounts
            .get_mut(&email)
            .ok_or(ProviderError::SessionExpired)?;
        account.password = new_password.to_string();
        Ok(())
    }

    fn on_session_change(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}
