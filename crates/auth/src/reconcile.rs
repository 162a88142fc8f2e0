//! Bounded retry loop bridging "principal exists" and "profile loaded".

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::error::ProfileError;
use crate::session::Principal;
use crate::state::AuthRuntime;

/// Pacing for the reconciliation loop.
#[derive(Debug, Clone, Copy)]
pub struct RetrySchedule {
    /// Maximum fetch attempts per sign-in before the loop gives up.
    pub cap: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Consecutive empty reads before a default profile is provisioned.
    pub provision_after_misses: u32,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            cap: 5,
            delay: Duration::from_millis(1000),
            provision_after_misses: 2,
        }
    }
}

/// Handle to a spawned reconciliation run.
pub(crate) struct ReconcileHandle {
    token: CancelToken,
    task: JoinHandle<()>,
}

impl ReconcileHandle {
    /// Stop the run: the pending retry timer is torn down and any in-flight
    /// fetch result is dropped at the token checkpoint instead of applied.
    pub(crate) fn cancel(self) {
        self.token.cancel();
        self.task.abort();
    }
}

pub(crate) fn spawn(rt: Arc<AuthRuntime>, principal: Principal) -> ReconcileHandle {
    let token = rt.token.child();
    let task = tokio::spawn(run(rt, principal, token.clone()));
    ReconcileHandle { token, task }
}

async fn run(rt: Arc<AuthRuntime>, principal: Principal, token: CancelToken) {
    let schedule = rt.schedule;
    let mut misses = 0u32;
    let mut provisioned = false;

    loop {
        // The loop is pinned to one identity: once the principal changes
        // the run ends, whether or not cancellation has reached it yet.
        if token.is_cancelled() || rt.state.principal_id() != Some(principal.id) {
            return;
        }
        let attempt = rt.state.next_attempt();
        let fetched = tokio::select! {
            res = rt.repo.fetch(principal.id) => res,
            _ = token.cancelled() => return,
        };

        match fetched {
            Ok(Some(profile)) => {
                if !token.is_cancelled() {
                    rt.state.set_profile(profile);
                }
                return;
            }
            Ok(None) => {
                misses += 1;
                tracing::debug!(principal = %principal.id, attempt, "profile row not found yet");
                // One provisioning shot per run; a racing explicit insert
                // wins through the conflict-is-success path.
                if !provisioned && misses >= schedule.provision_after_misses {
                    // Never write a row for a principal that has been
                    // signed out or superseded in the meantime.
                    if rt.state.principal_id() != Some(principal.id) {
                        return;
                    }
                    provisioned = true;
                    let outcome = tokio::select! {
                        res = rt.repo.provision_default(&principal) => res,
                        _ = token.cancelled() => return,
                    };
                    match outcome {
                        Ok(()) => {
                            // Provisioning resolved; re-read before this
                            // attempt can count as a failure.
                            let refetched = tokio::select! {
                                res = rt.repo.fetch(principal.id) => res,
                                _ = token.cancelled() => return,
                            };
                            match refetched {
                                Ok(Some(profile)) => {
                                    if !token.is_cancelled() {
                                        rt.state.set_profile(profile);
                                    }
                                    return;
                                }
                                Ok(None) => {
                                    tracing::debug!(principal = %principal.id, "row still absent after provisioning");
                                }
                                Err(error) => {
                                    tracing::warn!(principal = %principal.id, %error, "post-provision fetch failed");
                                }
                            }
                        }
                        Err(error) => {
                            tracing::warn!(principal = %principal.id, %error, "default profile provisioning failed");
                        }
                    }
                }
            }
            Err(error) => {
                misses = 0;
                tracing::warn!(principal = %principal.id, attempt, %error, "profile fetch failed");
            }
        }

        if attempt >= schedule.cap {
            let error = ProfileError::Exhausted { attempts: attempt };
            tracing::warn!(principal = %principal.id, %error, "profile reconciliation exhausted");
            if !token.is_cancelled() {
                rt.state.mark_profile_failed();
            }
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(schedule.delay) => {}
            _ = token.cancelled() => return,
        }
    }
}
