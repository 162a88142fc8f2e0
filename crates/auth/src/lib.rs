//! `wholesail-auth` — identity session and profile reconciliation.
//!
//! Keeps a locally cached `{session, principal, profile}` view consistent
//! with the hosted identity provider's session lifecycle: mirrors session
//! events into local state, fetches the principal's profile row, provisions
//! a default row when none has been written yet, and retries transient store
//! failures on a bounded schedule. The rest of the application consumes this
//! crate only through [`AuthService`].

pub mod authorize;
pub mod cancel;
pub mod error;
pub mod facade;
pub mod profile;
pub mod provider;
pub mod reconcile;
pub mod repository;
pub mod session;
pub mod state;
pub mod store;

mod listener;

pub use authorize::{Feature, can_access};
pub use cancel::CancelToken;
pub use error::{AuthError, ProfileError};
pub use facade::{AuthService, SignUpRequest};
pub use profile::{ApprovalStatus, NewProfile, Profile, ProfilePatch, Role};
pub use provider::{IdentityProvider, ProviderError};
pub use reconcile::RetrySchedule;
pub use repository::ProfileRepository;
pub use session::{Principal, PrincipalMetadata, Session, SessionChange, SessionEventKind};
pub use state::{AuthPhase, AuthSnapshot};
pub use store::{ProfileStore, StoreError};
