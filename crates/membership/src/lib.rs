//! Membership domain module (group join/approve/revoke lifecycle).
//!
//! This crate contains the business rules for a person's relationship to a
//! group, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage).

pub mod membership;
pub mod role;

pub use membership::{
    AdminChanged, ApproveMembership, ChangeRole, GroupRules, JoinGroup, Membership,
    MembershipApproved, MembershipCommand, MembershipEvent, MembershipRequested,
    MembershipRevoked, MembershipStatus, RequestMembership, RevokeMembership, RoleDowngraded,
    RoleUpgraded,
};
pub use role::MembershipRole;
