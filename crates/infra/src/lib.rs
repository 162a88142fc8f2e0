//! Infrastructure layer: adapters for the external identity provider and
//! profile store.
//!
//! The in-memory implementations here back local development and the
//! end-to-end tests; hosted-backend adapters plug in behind the same traits.

pub mod identity_provider;
pub mod profile_store;

pub use identity_provider::InMemoryIdentityProvider;
pub use profile_store::InMemoryProfileStore;
