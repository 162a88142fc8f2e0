//! Subscription that mirrors provider session events into local state.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::provider::IdentityProvider;
use crate::session::{SessionChange, SessionEventKind};
use crate::state::AuthRuntime;

pub(crate) struct SessionListener {
    rt: Arc<AuthRuntime>,
    provider: Arc<dyn IdentityProvider>,
}

impl SessionListener {
    pub(crate) fn spawn(rt: Arc<AuthRuntime>, provider: Arc<dyn IdentityProvider>) -> JoinHandle<()> {
        tokio::spawn(SessionListener { rt, provider }.run())
    }

    async fn run(self) {
        // Subscribe before the initial session read so nothing emitted in
        // between is missed.
        let mut events = self.provider.on_session_change();

        let initial = tokio::select! {
            res = self.provider.current_session() => res,
            _ = self.rt.token.cancelled() => return,
        };
        match initial {
            Ok(session) => {
                self.rt.state.set_session(session.clone());
                if let Some(session) = session {
                    // One inline load attempt before the facade reports ready.
                    self.rt.load_profile_once(session.principal).await;
                }
            }
            Err(error) => {
                tracing::warn!(%error, "initial session fetch failed");
            }
        }
        self.rt.state.mark_ready();

        loop {
            let change = tokio::select! {
                change = events.recv() => change,
                _ = self.rt.token.cancelled() => return,
            };
            match change {
                Ok(change) => self.apply(change).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "session event stream lagged, resyncing from provider");
                    let resynced = tokio::select! {
                        res = self.provider.current_session() => res,
                        _ = self.rt.token.cancelled() => return,
                    };
                    if let Ok(session) = resynced {
                        let kind = if session.is_some() {
                            SessionEventKind::SignedIn
                        } else {
                            SessionEventKind::SignedOut
                        };
                        self.apply(SessionChange { kind, session }).await;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    async fn apply(&self, change: SessionChange) {
        if self.rt.token.is_cancelled() {
            return;
        }

        let incoming = change.session.as_ref().map(|s| s.principal.id);
        if incoming != self.rt.state.principal_id() {
            // A pending retry for the old principal must not fire under the
            // new one.
            self.rt.cancel_reconcile().await;
        }
        if matches!(change.kind, SessionEventKind::SignedIn) {
            self.rt.state.reset_attempts();
        }
        tracing::debug!(kind = ?change.kind, principal = ?incoming, "session change");

        // Session and principal land before any profile load is triggered,
        // so observers never see a cross-identity pairing.
        self.rt.state.set_session(change.session.clone());

        match change.session {
            Some(session) => {
                let refresh_only = matches!(change.kind, SessionEventKind::TokenRefreshed)
                    && self.rt.state.profile_id() == Some(session.principal.id);
                if !refresh_only {
                    self.rt.start_reconcile(session.principal).await;
                }
            }
            None => {
                self.rt.cancel_reconcile().await;
                self.rt.state.reset_attempts();
            }
        }
    }
}
