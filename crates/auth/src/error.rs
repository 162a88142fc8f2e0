//! Error taxonomy for the identity subsystem.

use thiserror::Error;

use crate::provider::ProviderError;
use crate::store::StoreError;

/// Failure inside the profile fetch/provision path.
///
/// These stay internal to the reconciliation loop; callers only ever observe
/// an exhausted loop as a `None` profile next to a live principal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("profile fetch failed")]
    Fetch(#[source] StoreError),

    /// The row was still absent after provisioning resolved.
    #[error("profile row missing")]
    Missing,

    #[error("profile provisioning failed")]
    Provision(#[source] StoreError),

    #[error("profile still missing after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Failure returned by an explicit facade operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The provider account was created but the initial profile insert
    /// failed. The account remains usable; reconciliation retries the
    /// profile in the background.
    #[error("profile insert failed after account creation")]
    ProfileInsert(#[source] StoreError),

    #[error("profile update failed")]
    ProfileUpdate(#[source] StoreError),

    #[error("not signed in")]
    NotSignedIn,
}
