//! In-memory profile store with failure/latency injection.
//!
//! Intended for tests/dev. Not optimized for performance.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use wholesail_auth::{ApprovalStatus, NewProfile, Profile, ProfilePatch, ProfileStore, StoreError};
use wholesail_core::PrincipalId;

/// In-memory [`ProfileStore`].
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    rows: RwLock<HashMap<PrincipalId, Profile>>,
    reads: AtomicU32,
    fail_reads: AtomicU32,
    unreachable: AtomicBool,
    read_delay: RwLock<Duration>,
}

fn poisoned(_: impl core::fmt::Debug) -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total `select_by_id` calls observed (includes failed ones).
    pub fn read_count(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Fail the next `n` reads with a transport error.
    pub fn fail_next_reads(&self, n: u32) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    /// While set, every operation fails with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Artificial latency applied to reads issued from now on.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.write().expect("delay lock") = delay;
    }

    pub fn get(&self, id: PrincipalId) -> Option<Profile> {
        self.rows.read().expect("row lock").get(&id).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().expect("row lock").len()
    }

    /// Out-of-band administrative approval, the way the admin dashboard
    /// flips accounts live.
    pub fn approve(&self, id: PrincipalId) -> bool {
        let mut rows = self.rows.write().expect("row lock");
        match rows.get_mut(&id) {
            Some(row) => {
                row.approval_status = ApprovalStatus::Approved;
                row.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn select_by_id(&self, id: PrincipalId) -> Result<Option<Profile>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        // Latency is sampled at call time so tests can change it mid-flight
        // without affecting reads already issued.
        let delay = *self.read_delay.read().map_err(poisoned)?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.check_reachable()?;
        if self.fail_reads.load(Ordering::SeqCst) > 0 {
            self.fail_reads.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        Ok(self.rows.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn insert(&self, profile: NewProfile) -> Result<(), StoreError> {
        self.check_reachable()?;
        let mut rows = self.rows.write().map_err(poisoned)?;
        if rows.contains_key(&profile.id) {
            return Err(StoreError::Conflict);
        }
        let now = Utc::now();
        rows.insert(
            profile.id,
            Profile {
                id: profile.id,
                email: profile.email,
                full_name: profile.full_name,
                phone: profile.phone,
                company_name: profile.company_name,
                description: profile.description,
                role: profile.role,
                approval_status: profile.approval_status,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn update(&self, id: PrincipalId, patch: ProfilePatch) -> Result<Profile, StoreError> {
        self.check_reachable()?;
        let mut rows = self.rows.write().map_err(poisoned)?;
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(full_name) = patch.full_name {
            row.full_name = full_name;
        }
        if let Some(phone) = patch.phone {
            row.phone = Some(phone);
        }
        if let Some(company_name) = patch.company_name {
            row.company_name = Some(company_name);
        }
        if let Some(description) = patch.description {
            row.description = Some(description);
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}
