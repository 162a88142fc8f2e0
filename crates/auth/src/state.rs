//! Observable auth state shared by the facade, listener, and retry loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;
use tokio::sync::watch;

use wholesail_core::PrincipalId;

use crate::cancel::CancelToken;
use crate::profile::Profile;
use crate::reconcile::{self, ReconcileHandle, RetrySchedule};
use crate::repository::ProfileRepository;
use crate::session::{Principal, Session};

/// Where the principal/profile pairing currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    Unauthenticated,
    /// A sign-in is in flight; no usable pairing yet.
    Authenticating,
    /// Principal present, profile not yet loaded.
    ProfilePending,
    ProfileLoaded,
    /// Retries exhausted; the account is usable but incomplete until an
    /// explicit refresh.
    ProfileFailed,
}

/// The tuple republished to every consumer on each change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSnapshot {
    pub session: Option<Session>,
    pub principal: Option<Principal>,
    pub profile: Option<Profile>,
    /// True until the initial session/profile resolution completes.
    pub is_loading: bool,
    pub phase: AuthPhase,
}

impl AuthSnapshot {
    fn initial() -> Self {
        Self {
            session: None,
            principal: None,
            profile: None,
            is_loading: true,
            phase: AuthPhase::Unauthenticated,
        }
    }
}

/// Single source of truth for `{session, principal, profile}`.
///
/// All mutation goes through these helpers so the pairing invariant
/// (`profile.id == principal.id` whenever both exist) holds at every
/// observable point.
#[derive(Debug)]
pub(crate) struct AuthState {
    tx: watch::Sender<AuthSnapshot>,
    attempts: AtomicU32,
}

impl AuthState {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(AuthSnapshot::initial());
        Self {
            tx,
            attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn snapshot(&self) -> AuthSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn principal(&self) -> Option<Principal> {
        self.tx.borrow().principal.clone()
    }

    pub(crate) fn principal_id(&self) -> Option<PrincipalId> {
        self.tx.borrow().principal.as_ref().map(|p| p.id)
    }

    pub(crate) fn profile_id(&self) -> Option<PrincipalId> {
        self.tx.borrow().profile.as_ref().map(|p| p.id)
    }

    /// Replace session/principal. A held profile belonging to a different
    /// principal is dropped in the same update, before any observer can see
    /// the new pairing.
    pub(crate) fn set_session(&self, session: Option<Session>) {
        self.tx.send_modify(|s| {
            let principal = session.as_ref().map(|sess| sess.principal.clone());
            match (&principal, &s.profile) {
                (Some(p), Some(held)) if held.id != p.id => s.profile = None,
                (None, _) => s.profile = None,
                _ => {}
            }
            s.session = session;
            s.principal = principal;
            s.phase = Self::phase_of(s);
        });
    }

    /// Apply a fetched profile. Ignored unless it belongs to the current
    /// principal, so a late result for a superseded identity is discarded.
    /// Returns whether the profile was applied.
    pub(crate) fn set_profile(&self, profile: Profile) -> bool {
        let mut applied = false;
        self.tx.send_modify(|s| {
            if s.principal.as_ref().is_some_and(|p| p.id == profile.id) {
                s.profile = Some(profile);
                s.phase = AuthPhase::ProfileLoaded;
                applied = true;
            }
        });
        applied
    }

    pub(crate) fn clear_profile(&self) {
        self.tx.send_modify(|s| {
            s.profile = None;
            s.phase = Self::phase_of(s);
        });
    }

    /// Terminal state for this sign-in: retries capped without a profile.
    pub(crate) fn mark_profile_failed(&self) {
        self.tx.send_modify(|s| {
            if s.principal.is_some() && s.profile.is_none() {
                s.phase = AuthPhase::ProfileFailed;
            }
        });
    }

    pub(crate) fn set_authenticating(&self) {
        self.tx.send_modify(|s| s.phase = AuthPhase::Authenticating);
    }

    /// Recompute the phase from the held pairing (used after a failed
    /// sign-in attempt left the phase at `Authenticating`).
    pub(crate) fn settle_phase(&self) {
        self.tx.send_modify(|s| s.phase = Self::phase_of(s));
    }

    pub(crate) fn mark_ready(&self) {
        self.tx.send_modify(|s| s.is_loading = false);
    }

    pub(crate) fn clear_all(&self) {
        self.tx.send_modify(|s| {
            s.session = None;
            s.principal = None;
            s.profile = None;
            s.phase = AuthPhase::Unauthenticated;
        });
    }

    pub(crate) fn reset_attempts(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    /// Count one fetch attempt, returning its ordinal since the last reset.
    pub(crate) fn next_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn phase_of(s: &AuthSnapshot) -> AuthPhase {
        match (&s.principal, &s.profile) {
            (None, _) => AuthPhase::Unauthenticated,
            (Some(_), None) => AuthPhase::ProfilePending,
            (Some(_), Some(_)) => AuthPhase::ProfileLoaded,
        }
    }
}

/// Shared wiring handed to the listener and the retry loop.
pub(crate) struct AuthRuntime {
    pub(crate) state: AuthState,
    pub(crate) repo: ProfileRepository,
    pub(crate) schedule: RetrySchedule,
    pub(crate) token: CancelToken,
    reconcile: tokio::sync::Mutex<Option<ReconcileHandle>>,
}

impl AuthRuntime {
    pub(crate) fn new(repo: ProfileRepository, schedule: RetrySchedule) -> Self {
        Self {
            state: AuthState::new(),
            repo,
            schedule,
            token: CancelToken::new(),
            reconcile: tokio::sync::Mutex::new(None),
        }
    }

    /// Start (or restart) the reconciliation loop for a principal. Any
    /// previous run is cancelled so its pending retry can never fire into
    /// the new identity. Refused for a principal that is no longer the
    /// current one, so a late miss from a superseded sign-in can neither
    /// replace nor cancel the current principal's loop.
    pub(crate) async fn start_reconcile(self: &Arc<Self>, principal: Principal) {
        let mut slot = self.reconcile.lock().await;
        if self.state.principal_id() != Some(principal.id) {
            tracing::debug!(principal = %principal.id, "stale reconcile request dropped");
            return;
        }
        let handle = reconcile::spawn(self.clone(), principal);
        if let Some(old) = slot.replace(handle) {
            old.cancel();
        }
    }

    pub(crate) async fn cancel_reconcile(&self) {
        if let Some(handle) = self.reconcile.lock().await.take() {
            handle.cancel();
        }
    }

    /// One immediate fetch attempt; on miss or error the bounded retry loop
    /// takes over.
    pub(crate) async fn load_profile_once(self: &Arc<Self>, principal: Principal) {
        let attempt = self.state.next_attempt();
        let fetched = tokio::select! {
            res = self.repo.fetch(principal.id) => res,
            _ = self.token.cancelled() => return,
        };
        match fetched {
            Ok(Some(profile)) => {
                if !self.token.is_cancelled() {
                    self.state.set_profile(profile);
                }
            }
            Ok(None) => {
                tracing::debug!(principal = %principal.id, attempt, "profile row not found on first load");
                self.start_reconcile(principal).await;
            }
            Err(error) => {
                tracing::warn!(principal = %principal.id, attempt, %error, "initial profile fetch failed");
                self.start_reconcile(principal).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crate::profile::{ApprovalStatus, Role};
    use crate::session::PrincipalMetadata;

    fn session_for(id: PrincipalId, email: &str) -> Session {
        Session {
            access_token: "tok".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            principal: Principal {
                id,
                email: email.to_string(),
                metadata: PrincipalMetadata::default(),
            },
        }
    }

    fn profile_for(id: PrincipalId, email: &str) -> Profile {
        Profile {
            id,
            email: email.to_string(),
            full_name: "Someone".to_string(),
            phone: None,
            company_name: None,
            description: None,
            role: Role::Buyer,
            approval_status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn profile_for_other_principal_is_rejected() {
        let state = AuthState::new();
        let id = PrincipalId::new();
        state.set_session(Some(session_for(id, "a@x.test")));

        let applied = state.set_profile(profile_for(PrincipalId::new(), "b@x.test"));
        assert!(!applied);
        assert_eq!(state.snapshot().profile, None);

        let applied = state.set_profile(profile_for(id, "a@x.test"));
        assert!(applied);
        assert_eq!(state.snapshot().phase, AuthPhase::ProfileLoaded);
    }

    #[test]
    fn principal_swap_drops_stale_profile() {
        let state = AuthState::new();
        let a = PrincipalId::new();
        state.set_session(Some(session_for(a, "a@x.test")));
        assert!(state.set_profile(profile_for(a, "a@x.test")));

        let b = PrincipalId::new();
        state.set_session(Some(session_for(b, "b@x.test")));
        let snap = state.snapshot();
        assert_eq!(snap.profile, None);
        assert_eq!(snap.phase, AuthPhase::ProfilePending);
    }

    #[test]
    fn session_end_clears_profile() {
        let state = AuthState::new();
        let a = PrincipalId::new();
        state.set_session(Some(session_for(a, "a@x.test")));
        assert!(state.set_profile(profile_for(a, "a@x.test")));

        state.set_session(None);
        let snap = state.snapshot();
        assert_eq!(snap.principal, None);
        assert_eq!(snap.profile, None);
        assert_eq!(snap.phase, AuthPhase::Unauthenticated);
    }

    #[test]
    fn profile_failed_requires_pending_pairing() {
        let state = AuthState::new();
        // No principal: marking failed is a no-op.
        state.mark_profile_failed();
        assert_eq!(state.snapshot().phase, AuthPhase::Unauthenticated);

        let a = PrincipalId::new();
        state.set_session(Some(session_for(a, "a@x.test")));
        state.mark_profile_failed();
        assert_eq!(state.snapshot().phase, AuthPhase::ProfileFailed);
    }

    #[test]
    fn attempt_counter_resets() {
        let state = AuthState::new();
        assert_eq!(state.next_attempt(), 1);
        assert_eq!(state.next_attempt(), 2);
        state.reset_attempts();
        assert_eq!(state.next_attempt(), 1);
    }
}
