//! Port to the profile record store.

use async_trait::async_trait;
use thiserror::Error;

use wholesail_core::PrincipalId;

use crate::profile::{NewProfile, Profile, ProfilePatch};

/// Transport-level failure from the profile store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unique-key violation on insert. Benign during provisioning races.
    #[error("profile already exists")]
    Conflict,

    /// The row targeted by an update is missing.
    #[error("profile not found")]
    NotFound,

    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

/// Single-entity table keyed by principal id.
///
/// Operations are assumed atomic at the single-record level; no further
/// locking is layered on top.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn select_by_id(&self, id: PrincipalId) -> Result<Option<Profile>, StoreError>;

    async fn insert(&self, profile: NewProfile) -> Result<(), StoreError>;

    async fn update(&self, id: PrincipalId, patch: ProfilePatch) -> Result<Profile, StoreError>;
}
