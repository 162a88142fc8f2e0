//! Role/approval gating for UI decision points.
//!
//! One decision function over the tagged `Role`/`ApprovalStatus` unions, so
//! route layouts and headers never re-derive access from raw field checks.

use crate::profile::{ApprovalStatus, Profile, Role};

/// Application surface guarded by a role/approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    AdminConsole,
    SalesDesk,
    BrandPortal,
    BuyerPortal,
    /// Editing one's own contact fields; available to any loaded profile.
    AccountSettings,
}

/// Single decision point for role/approval gating.
///
/// `None` means no profile is loaded (still pending, or reconciliation
/// exhausted); such accounts reach nothing. Admins pass every gate; all
/// other roles need an approved profile and only reach their own portal.
pub fn can_access(profile: Option<&Profile>, feature: Feature) -> bool {
    let Some(profile) = profile else {
        return false;
    };
    if feature == Feature::AccountSettings {
        return true;
    }
    match (profile.role, profile.approval_status) {
        (Role::Admin, _) => true,
        (_, ApprovalStatus::Pending) | (_, ApprovalStatus::Rejected) => false,
        (Role::SalesManager, ApprovalStatus::Approved) => feature == Feature::SalesDesk,
        (Role::Brand, ApprovalStatus::Approved) => feature == Feature::BrandPortal,
        (Role::Buyer, ApprovalStatus::Approved) => feature == Feature::BuyerPortal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    use wholesail_core::PrincipalId;

    const ALL_FEATURES: [Feature; 5] = [
        Feature::AdminConsole,
        Feature::SalesDesk,
        Feature::BrandPortal,
        Feature::BuyerPortal,
        Feature::AccountSettings,
    ];

    fn profile(role: Role, approval_status: ApprovalStatus) -> Profile {
        Profile {
            id: PrincipalId::new(),
            email: "gate@x.test".to_string(),
            full_name: "Gate".to_string(),
            phone: None,
            company_name: None,
            description: None,
            role,
            approval_status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn missing_profile_reaches_nothing() {
        for feature in ALL_FEATURES {
            assert!(!can_access(None, feature));
        }
    }

    #[test]
    fn approved_roles_reach_their_own_portal_only() {
        let brand = profile(Role::Brand, ApprovalStatus::Approved);
        assert!(can_access(Some(&brand), Feature::BrandPortal));
        assert!(!can_access(Some(&brand), Feature::BuyerPortal));
        assert!(!can_access(Some(&brand), Feature::SalesDesk));
        assert!(!can_access(Some(&brand), Feature::AdminConsole));

        let sales = profile(Role::SalesManager, ApprovalStatus::Approved);
        assert!(can_access(Some(&sales), Feature::SalesDesk));
        assert!(!can_access(Some(&sales), Feature::BrandPortal));
    }

    #[test]
    fn account_settings_need_only_a_loaded_profile() {
        let rejected = profile(Role::Buyer, ApprovalStatus::Rejected);
        assert!(can_access(Some(&rejected), Feature::AccountSettings));
    }

    fn role_strategy() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Admin),
            Just(Role::SalesManager),
            Just(Role::Brand),
            Just(Role::Buyer),
        ]
    }

    fn status_strategy() -> impl Strategy<Value = ApprovalStatus> {
        prop_oneof![
            Just(ApprovalStatus::Pending),
            Just(ApprovalStatus::Approved),
            Just(ApprovalStatus::Rejected),
        ]
    }

    proptest! {
        #[test]
        fn admins_pass_every_gate(status in status_strategy()) {
            let p = profile(Role::Admin, status);
            for feature in ALL_FEATURES {
                prop_assert!(can_access(Some(&p), feature));
            }
        }

        #[test]
        fn unapproved_non_admins_reach_no_portal(
            role in role_strategy(),
            status in status_strategy(),
        ) {
            prop_assume!(role != Role::Admin);
            prop_assume!(status != ApprovalStatus::Approved);
            let p = profile(role, status);
            for feature in ALL_FEATURES {
                if feature != Feature::AccountSettings {
                    prop_assert!(!can_access(Some(&p), feature));
                }
            }
        }
    }
}
