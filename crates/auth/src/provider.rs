//! Port to the external identity provider.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::session::{PrincipalMetadata, Session, SessionChange};

/// Rejection from the identity provider for an explicit user action.
///
/// These are surfaced to the caller immediately and never retried
/// automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid or expired one-time code")]
    InvalidCode,

    #[error("email is already registered")]
    EmailTaken,

    #[error("no active session")]
    SessionExpired,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Hosted identity session source.
///
/// Implementations own session issuance and expiry. Subscribers must call
/// [`IdentityProvider::on_session_change`] before triggering auth operations
/// so no lifecycle event is missed.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: PrincipalMetadata,
    ) -> Result<Session, ProviderError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// The session the provider currently considers active, if any.
    async fn current_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Exchange a one-time code (email confirmation, password recovery) for
    /// a session.
    async fn verify_one_time_code(&self, email: &str, code: &str)
    -> Result<Session, ProviderError>;

    /// Replace the password of the currently signed-in principal.
    async fn update_credential(&self, new_password: &str) -> Result<(), ProviderError>;

    /// Subscribe to session lifecycle events.
    fn on_session_change(&self) -> broadcast::Receiver<SessionChange>;
}
