//! Fetch-or-provision access to the profile store.

use std::sync::Arc;

use wholesail_core::PrincipalId;

use crate::error::ProfileError;
use crate::profile::{ApprovalStatus, NewProfile, Profile, ProfilePatch};
use crate::session::Principal;
use crate::store::{ProfileStore, StoreError};

impl NewProfile {
    /// Default row provisioned for a principal that has none: contact
    /// fields empty, role from signup intent (else buyer), approval
    /// pending.
    pub fn default_for(principal: &Principal) -> Self {
        Self {
            id: principal.id,
            email: principal.email.clone(),
            full_name: principal.display_name(),
            phone: None,
            company_name: None,
            description: None,
            role: principal.metadata.requested_role.unwrap_or_default(),
            approval_status: ApprovalStatus::Pending,
        }
    }
}

/// Repository over the profile store.
#[derive(Clone)]
pub struct ProfileRepository {
    store: Arc<dyn ProfileStore>,
}

impl ProfileRepository {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Single read by principal id.
    pub async fn fetch(&self, id: PrincipalId) -> Result<Option<Profile>, StoreError> {
        self.store.select_by_id(id).await
    }

    pub async fn insert(&self, profile: NewProfile) -> Result<(), StoreError> {
        self.store.insert(profile).await
    }

    pub async fn update(&self, id: PrincipalId, patch: ProfilePatch) -> Result<Profile, StoreError> {
        self.store.update(id, patch).await
    }

    /// Insert the default profile for a principal that has none.
    ///
    /// A conflict means another writer (the explicit sign-up insert, or a
    /// racing reconciliation run) got there first; that counts as success.
    pub async fn provision_default(&self, principal: &Principal) -> Result<(), ProfileError> {
        match self.store.insert(NewProfile::default_for(principal)).await {
            Ok(()) => {
                tracing::info!(principal = %principal.id, "provisioned default profile");
                Ok(())
            }
            Err(StoreError::Conflict) => {
                tracing::debug!(principal = %principal.id, "profile already present, insert conflict ignored");
                Ok(())
            }
            Err(error) => Err(ProfileError::Provision(error)),
        }
    }

    /// Fetch, provisioning a default row when the read comes back empty.
    ///
    /// After provisioning resolves (success or benign conflict) the row is
    /// re-read before any failure is reported.
    pub async fn fetch_or_provision(&self, principal: &Principal) -> Result<Profile, ProfileError> {
        if let Some(profile) = self.fetch(principal.id).await.map_err(ProfileError::Fetch)? {
            return Ok(profile);
        }
        self.provision_default(principal).await?;
        self.fetch(principal.id)
            .await
            .map_err(ProfileError::Fetch)?
            .ok_or(ProfileError::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::profile::Role;
    use crate::session::PrincipalMetadata;

    /// Store stub replaying a scripted sequence of read results while
    /// recording inserts.
    #[derive(Default)]
    struct ScriptedStore {
        reads: Mutex<VecDeque<Result<Option<Profile>, StoreError>>>,
        insert_result: Mutex<Option<StoreError>>,
        inserted: Mutex<Vec<NewProfile>>,
    }

    impl ScriptedStore {
        fn with_reads(
            reads: impl IntoIterator<Item = Result<Option<Profile>, StoreError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                reads: Mutex::new(reads.into_iter().collect()),
                ..Default::default()
            })
        }

        fn failing_inserts(self: Arc<Self>, error: StoreError) -> Arc<Self> {
            *self.insert_result.lock().unwrap() = Some(error);
            self
        }
    }

    #[async_trait]
    impl ProfileStore for ScriptedStore {
        async fn select_by_id(&self, _id: PrincipalId) -> Result<Option<Profile>, StoreError> {
            self.reads
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }

        async fn insert(&self, profile: NewProfile) -> Result<(), StoreError> {
            if let Some(error) = self.insert_result.lock().unwrap().clone() {
                return Err(error);
            }
            self.inserted.lock().unwrap().push(profile);
            Ok(())
        }

        async fn update(&self, _id: PrincipalId, _patch: ProfilePatch) -> Result<Profile, StoreError> {
            Err(StoreError::NotFound)
        }
    }

    fn principal() -> Principal {
        Principal {
            id: PrincipalId::new(),
            email: "lena@brandco.test".to_string(),
            metadata: PrincipalMetadata {
                full_name: Some("Lena Berg".to_string()),
                requested_role: Some(Role::Brand),
            },
        }
    }

    fn stored(principal: &Principal) -> Profile {
        Profile {
            id: principal.id,
            email: principal.email.clone(),
            full_name: "Lena Berg".to_string(),
            phone: None,
            company_name: None,
            description: None,
            role: Role::Brand,
            approval_status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fetch_or_provision_returns_existing_row() {
        let p = principal();
        let store = ScriptedStore::with_reads([Ok(Some(stored(&p)))]);
        let repo = ProfileRepository::new(store.clone());

        let profile = repo.fetch_or_provision(&p).await.unwrap();
        assert_eq!(profile.id, p.id);
        assert!(store.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_or_provision_inserts_default_on_miss() {
        let p = principal();
        let store = ScriptedStore::with_reads([Ok(None), Ok(Some(stored(&p)))]);
        let repo = ProfileRepository::new(store.clone());

        let profile = repo.fetch_or_provision(&p).await.unwrap();
        assert_eq!(profile.id, p.id);

        let inserted = store.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].role, Role::Brand);
        assert_eq!(inserted[0].approval_status, ApprovalStatus::Pending);
        assert_eq!(inserted[0].full_name, "Lena Berg");
    }

    #[tokio::test]
    async fn insert_conflict_is_followed_by_refetch() {
        let p = principal();
        let store = ScriptedStore::with_reads([Ok(None), Ok(Some(stored(&p)))])
            .failing_inserts(StoreError::Conflict);
        let repo = ProfileRepository::new(store.clone());

        // Conflict means someone else inserted; the re-read must win.
        let profile = repo.fetch_or_provision(&p).await.unwrap();
        assert_eq!(profile.id, p.id);
    }

    #[tokio::test]
    async fn non_conflict_insert_failure_is_reported() {
        let p = principal();
        let store = ScriptedStore::with_reads([Ok(None)])
            .failing_inserts(StoreError::Unavailable("down".to_string()));
        let repo = ProfileRepository::new(store);

        let err = repo.fetch_or_provision(&p).await.unwrap_err();
        assert!(matches!(err, ProfileError::Provision(_)));
    }

    #[tokio::test]
    async fn missing_after_provision_is_distinct() {
        let p = principal();
        let store = ScriptedStore::with_reads([Ok(None), Ok(None)]);
        let repo = ProfileRepository::new(store);

        let err = repo.fetch_or_provision(&p).await.unwrap_err();
        assert_eq!(err, ProfileError::Missing);
    }

    #[tokio::test]
    async fn default_role_is_buyer_without_signup_intent() {
        let mut p = principal();
        p.metadata.requested_role = None;
        let row = NewProfile::default_for(&p);
        assert_eq!(row.role, Role::Buyer);
    }
}
