//! The single integration surface the rest of the application consumes.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::AuthError;
use crate::listener::SessionListener;
use crate::profile::{ApprovalStatus, NewProfile, Profile, ProfilePatch, Role};
use crate::provider::IdentityProvider;
use crate::reconcile::RetrySchedule;
use crate::repository::ProfileRepository;
use crate::session::PrincipalMetadata;
use crate::state::{AuthRuntime, AuthSnapshot};
use crate::store::{ProfileStore, StoreError};

/// Registration input from the sign-up screens.
#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub description: Option<String>,
    pub role: Option<Role>,
}

impl SignUpRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            full_name: None,
            phone: None,
            company_name: None,
            description: None,
            role: None,
        }
    }
}

/// Auth service object, constructed once at application start and passed by
/// reference to consumers (header components, role-gated layouts, management
/// screens).
///
/// Owns the session listener task and the reconciliation loop; dropping the
/// service cancels both and causes any in-flight fetch result to be
/// discarded instead of applied.
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    rt: Arc<AuthRuntime>,
    listener: JoinHandle<()>,
}

impl AuthService {
    pub fn start(provider: Arc<dyn IdentityProvider>, store: Arc<dyn ProfileStore>) -> Self {
        Self::with_schedule(provider, store, RetrySchedule::default())
    }

    pub fn with_schedule(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn ProfileStore>,
        schedule: RetrySchedule,
    ) -> Self {
        let rt = Arc::new(AuthRuntime::new(ProfileRepository::new(store), schedule));
        let listener = SessionListener::spawn(rt.clone(), provider.clone());
        Self {
            provider,
            rt,
            listener,
        }
    }

    /// Watch the `{session, principal, profile}` tuple for changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.rt.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.rt.state.snapshot()
    }

    /// Create a provider account, then insert the initial profile row with
    /// `approval_status = pending`.
    ///
    /// The two failure modes stay distinct: a provider rejection arrives as
    /// [`AuthError::Provider`] before anything exists, while a failed insert
    /// after account creation arrives as [`AuthError::ProfileInsert`] with
    /// the session already live (reconciliation self-heals the row later).
    pub async fn sign_up(&self, req: SignUpRequest) -> Result<(), AuthError> {
        let metadata = PrincipalMetadata {
            full_name: req.full_name.clone(),
            requested_role: req.role,
        };
        let session = self
            .provider
            .sign_up(&req.email, &req.password, metadata)
            .await?;

        let principal = session.principal;
        let row = NewProfile {
            id: principal.id,
            email: principal.email.clone(),
            full_name: req.full_name.unwrap_or_else(|| principal.display_name()),
            phone: req.phone,
            company_name: req.company_name,
            description: req.description,
            role: req.role.unwrap_or_default(),
            approval_status: ApprovalStatus::Pending,
        };
        match self.rt.repo.insert(row).await {
            Ok(()) | Err(StoreError::Conflict) => Ok(()),
            Err(error) => {
                tracing::warn!(principal = %principal.id, %error, "initial profile insert failed");
                Err(AuthError::ProfileInsert(error))
            }
        }
    }

    /// Authenticate with email and password.
    ///
    /// The held profile and the attempt counter are cleared before the
    /// provider call so the previous user's profile can never show against
    /// the incoming identity. On success one immediate fetch runs as a fast
    /// path; misses and errors are handed to the reconciliation loop.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.rt.cancel_reconcile().await;
        self.rt.state.clear_profile();
        self.rt.state.reset_attempts();
        self.rt.state.set_authenticating();

        match self.provider.sign_in_with_password(email, password).await {
            Ok(session) => {
                // The SignedIn broadcast lands in the listener as well; the
                // state updates are idempotent across the two paths.
                self.rt.state.set_session(Some(session.clone()));
                self.rt.load_profile_once(session.principal).await;
                Ok(())
            }
            Err(error) => {
                self.rt.state.settle_phase();
                // A rejected re-auth leaves the previous session live; the
                // retained principal gets their profile reloaded.
                if let Some(principal) = self.rt.state.principal() {
                    self.rt.start_reconcile(principal).await;
                }
                Err(error.into())
            }
        }
    }

    /// End the session. Local state is cleared only after the provider
    /// confirms, so a failed call never flashes a false "logged out" state.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.provider.sign_out().await?;
        self.rt.cancel_reconcile().await;
        self.rt.state.clear_all();
        self.rt.state.reset_attempts();
        Ok(())
    }

    /// Manually re-run the fetch-or-provision sequence. Safe to call with no
    /// active principal. Resets the attempt budget, so an account stuck in
    /// the exhausted state gets a fresh round of retries.
    pub async fn refresh_profile(&self) {
        let Some(principal) = self.rt.state.principal() else {
            return;
        };
        self.rt.cancel_reconcile().await;
        self.rt.state.reset_attempts();
        match self.rt.repo.fetch_or_provision(&principal).await {
            Ok(profile) => {
                self.rt.state.set_profile(profile);
            }
            Err(error) => {
                tracing::warn!(principal = %principal.id, %error, "profile refresh failed, retrying in background");
                self.rt.start_reconcile(principal).await;
            }
        }
    }

    /// Exchange a one-time code (email confirmation / recovery) for a
    /// session, then load the profile like a normal sign-in.
    pub async fn verify_one_time_code(&self, email: &str, code: &str) -> Result<(), AuthError> {
        self.rt.cancel_reconcile().await;
        self.rt.state.clear_profile();
        self.rt.state.reset_attempts();
        match self.provider.verify_one_time_code(email, code).await {
            Ok(session) => {
                self.rt.state.set_session(Some(session.clone()));
                self.rt.load_profile_once(session.principal).await;
                Ok(())
            }
            Err(error) => {
                if let Some(principal) = self.rt.state.principal() {
                    self.rt.start_reconcile(principal).await;
                }
                Err(error.into())
            }
        }
    }

    /// Replace the password of the signed-in principal.
    pub async fn update_credential(&self, new_password: &str) -> Result<(), AuthError> {
        self.provider.update_credential(new_password).await?;
        Ok(())
    }

    /// Apply edits to the signed-in principal's profile and republish the
    /// fresh row.
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<Profile, AuthError> {
        let Some(principal) = self.rt.state.principal() else {
            return Err(AuthError::NotSignedIn);
        };
        // Unchanged form submissions skip the write.
        if patch.is_empty() {
            if let Some(profile) = self.rt.state.snapshot().profile {
                return Ok(profile);
            }
        }
        let profile = self
            .rt
            .repo
            .update(principal.id, patch)
            .await
            .map_err(AuthError::ProfileUpdate)?;
        self.rt.state.set_profile(profile.clone());
        Ok(profile)
    }

    /// Tear down the listener and any pending retry. Idempotent; also runs
    /// on drop.
    pub fn shutdown(&self) {
        self.rt.token.cancel();
    }
}

impl Drop for AuthService {
    fn drop(&mut self) {
        self.rt.token.cancel();
        self.listener.abort();
    }
}
