//! Profile record and the role/approval vocabulary.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wholesail_core::{DomainError, PrincipalId};

/// Marketplace role a profile is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    SalesManager,
    Brand,
    /// Default for accounts that never stated a role at sign-up.
    #[default]
    Buyer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SalesManager => "sales_manager",
            Role::Brand => "brand",
            Role::Buyer => "buyer",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "sales_manager" => Ok(Role::SalesManager),
            "brand" => Ok(Role::Brand),
            "buyer" => Ok(Role::Buyer),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Gate value controlling access to role-specific features.
///
/// Set to `Pending` at creation; flipped out-of-band by administrative
/// approval actions. This subsystem never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(DomainError::validation(format!(
                "unknown approval status '{other}'"
            ))),
        }
    }
}

/// Application-level record describing a principal.
///
/// Keyed by the principal's id: `Profile.id == Principal.id` whenever both
/// exist. Created at sign-up or lazily provisioned by the reconciliation
/// loop; never deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: PrincipalId,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub description: Option<String>,
    pub role: Role,
    pub approval_status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a profile row. The store stamps the timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProfile {
    pub id: PrincipalId,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub description: Option<String>,
    pub role: Role,
    pub approval_status: ApprovalStatus,
}

/// Fields a signed-in user may edit from the account screens.
///
/// `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub description: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.phone.is_none()
            && self.company_name.is_none()
            && self.description.is_none()
    }
}
