//! Membership aggregate (request/join/approve/revoke lifecycle).
//!
//! # Invariants
//! - Status only moves forward: Pending → Approved → Removed; a direct join
//!   starts at Approved. Removed is terminal.
//! - Role changes require an Approved membership.
//! - Approval requires an actor role >= Sponsor; revocation by someone else
//!   requires >= Administrator; self-removal requires the group policy flag.
//! - At most one live membership per (person, group); re-requesting while
//!   Pending is idempotent and emits nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accord_core::{Aggregate, AggregateRoot, DomainError, GroupId, MembershipId, PersonId};
use accord_events::Event;

use crate::role::MembershipRole;

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a membership record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Approved,
    Removed,
}

impl MembershipStatus {
    /// Removed records never transition again; rejoining starts a new record.
    pub fn is_terminal(self) -> bool {
        self == MembershipStatus::Removed
    }
}

impl core::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MembershipStatus::Pending => write!(f, "pending"),
            MembershipStatus::Approved => write!(f, "approved"),
            MembershipStatus::Removed => write!(f, "removed"),
        }
    }
}

/// Snapshot of the group policy flags a command was evaluated against.
///
/// Carried on commands so `handle` stays pure: the caller reads the group
/// record once and the decision is made against that snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GroupRules {
    /// Members may leave voluntarily without administrator action.
    pub self_removal: bool,
    /// Joining goes through request + sponsor approval.
    pub need_approval: bool,
    /// Joining requires an invitation; requests are refused.
    pub invite_only: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Membership aggregate: one person's relationship to one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub person_id: PersonId,
    pub group_id: GroupId,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    /// Person who approved the request, if any.
    pub sponsor: Option<PersonId>,
    pub version: u64,
    pub created: bool,
}

impl Membership {
    /// A not-yet-existing membership for (person, group).
    pub fn empty(id: MembershipId, person_id: PersonId, group_id: GroupId) -> Self {
        Self {
            id,
            person_id,
            group_id,
            role: MembershipRole::Unknown,
            status: MembershipStatus::Pending,
            sponsor: None,
            version: 0,
            created: false,
        }
    }

    /// A record that exists and has not been removed.
    pub fn is_live(&self) -> bool {
        self.created && !self.status.is_terminal()
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    fn ensure_not_removed(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invariant(
                "membership was removed; rejoining starts a new record",
            ));
        }
        Ok(())
    }
}

impl AggregateRoot for Membership {
    type Id = MembershipId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Command to request membership in a group (goes through approval).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMembership {
    pub person_id: PersonId,
    pub group_id: GroupId,
    pub rules: GroupRules,
    pub occurred_at: DateTime<Utc>,
}

/// Command to join a group directly at Approved status.
///
/// Used for self-service groups and for administrative force-joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGroup {
    pub person_id: PersonId,
    pub group_id: GroupId,
    pub rules: GroupRules,
    /// True when a group/global administrator performs the join on someone's
    /// behalf; bypasses the `need_approval` and `invite_only` policies.
    pub administrative: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command to approve a pending membership request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveMembership {
    pub actor: PersonId,
    /// The actor's effective role in the target group (for the sponsor check).
    pub actor_role: MembershipRole,
    pub occurred_at: DateTime<Utc>,
}

/// Command to revoke a membership (voluntary exit or administrative action).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeMembership {
    pub actor: PersonId,
    pub actor_role: MembershipRole,
    pub rules: GroupRules,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command to change the member's role within the group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRole {
    pub actor: PersonId,
    pub actor_role: MembershipRole,
    pub new_role: MembershipRole,
    /// Current principal administrator of the group, if any; reported by
    /// `AdminChanged` when the change hands over the administrator role.
    pub previous_admin: Option<PersonId>,
    pub occurred_at: DateTime<Utc>,
}

/// All membership commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MembershipCommand {
    Request(RequestMembership),
    Join(JoinGroup),
    Approve(ApproveMembership),
    Revoke(RevokeMembership),
    ChangeRole(ChangeRole),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Event emitted when membership is requested (status Pending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRequested {
    pub membership_id: MembershipId,
    pub person_id: PersonId,
    pub group_id: GroupId,
    pub occurred_at: DateTime<Utc>,
}

/// Event emitted when a membership becomes Approved (by approval or direct join).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipApproved {
    pub membership_id: MembershipId,
    pub person_id: PersonId,
    pub group_id: GroupId,
    /// Approving sponsor; `None` for a direct (self-service) join.
    pub sponsor: Option<PersonId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event emitted when a membership is revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRevoked {
    pub membership_id: MembershipId,
    pub person_id: PersonId,
    pub group_id: GroupId,
    /// Voluntary exit (true) vs administrative removal (false); selects the
    /// notification template.
    pub self_removal: bool,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event emitted when a member's role moves up the scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpgraded {
    pub membership_id: MembershipId,
    pub person_id: PersonId,
    pub group_id: GroupId,
    pub previous: MembershipRole,
    pub role: MembershipRole,
    pub occurred_at: DateTime<Utc>,
}

/// Event emitted when a member's role moves down the scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDowngraded {
    pub membership_id: MembershipId,
    pub person_id: PersonId,
    pub group_id: GroupId,
    pub previous: MembershipRole,
    pub role: MembershipRole,
    pub occurred_at: DateTime<Utc>,
}

/// Event emitted when the administrator role changes hands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminChanged {
    pub group_id: GroupId,
    pub previous_admin: Option<PersonId>,
    pub new_admin: PersonId,
    pub occurred_at: DateTime<Utc>,
}

/// All membership events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEvent {
    Requested(MembershipRequested),
    Approved(MembershipApproved),
    Revoked(MembershipRevoked),
    RoleUpgraded(RoleUpgraded),
    RoleDowngraded(RoleDowngraded),
    AdminChanged(AdminChanged),
}

impl Event for MembershipEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MembershipEvent::Requested(_) => "membership.requested",
            MembershipEvent::Approved(_) => "membership.approved",
            MembershipEvent::Revoked(_) => "membership.revoked",
            MembershipEvent::RoleUpgraded(_) => "membership.role_upgraded",
            MembershipEvent::RoleDowngraded(_) => "membership.role_downgraded",
            MembershipEvent::AdminChanged(_) => "membership.admin_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MembershipEvent::Requested(e) => e.occurred_at,
            MembershipEvent::Approved(e) => e.occurred_at,
            MembershipEvent::Revoked(e) => e.occurred_at,
            MembershipEvent::RoleUpgraded(e) => e.occurred_at,
            MembershipEvent::RoleDowngraded(e) => e.occurred_at,
            MembershipEvent::AdminChanged(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Membership {
    type Command = MembershipCommand;
    type Event = MembershipEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MembershipEvent::Requested(e) => self.apply_requested(e),
            MembershipEvent::Approved(e) => self.apply_approved(e),
            MembershipEvent::Revoked(e) => self.apply_revoked(e),
            MembershipEvent::RoleUpgraded(e) => self.role = e.role,
            MembershipEvent::RoleDowngraded(e) => self.role = e.role,
            MembershipEvent::AdminChanged(_) => {}
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MembershipCommand::Request(cmd) => self.handle_request(cmd),
            MembershipCommand::Join(cmd) => self.handle_join(cmd),
            MembershipCommand::Approve(cmd) => self.handle_approve(cmd),
            MembershipCommand::Revoke(cmd) => self.handle_revoke(cmd),
            MembershipCommand::ChangeRole(cmd) => self.handle_change_role(cmd),
        }
    }
}

impl Membership {
    // ─────────────────────────────────────────────────────────────────────────
    // Command Handlers
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_request(&self, cmd: &RequestMembership) -> Result<Vec<MembershipEvent>, DomainError> {
        if self.created {
            return match self.status {
                // Re-requesting while pending is idempotent: no duplicate
                // record, nothing to announce.
                MembershipStatus::Pending => Ok(vec![]),
                MembershipStatus::Approved => Err(DomainError::AlreadyMember),
                MembershipStatus::Removed => self.ensure_not_removed().map(|_| vec![]),
            };
        }

        // No invite subsystem exists; requests against invite-only groups
        // are always refused.
        if cmd.rules.invite_only {
            return Err(DomainError::InviteOnly);
        }

        Ok(vec![MembershipEvent::Requested(MembershipRequested {
            membership_id: self.id,
            person_id: cmd.person_id,
            group_id: cmd.group_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_join(&self, cmd: &JoinGroup) -> Result<Vec<MembershipEvent>, DomainError> {
        if self.created {
            match self.status {
                MembershipStatus::Approved => return Err(DomainError::AlreadyMember),
                MembershipStatus::Removed => {
                    self.ensure_not_removed()?;
                }
                // A pending request may be short-circuited into a join when
                // the policy allows it.
                MembershipStatus::Pending => {}
            }
        }

        if !cmd.administrative {
            if cmd.rules.invite_only {
                return Err(DomainError::InviteOnly);
            }
            if cmd.rules.need_approval {
                return Err(DomainError::forbidden(
                    "group membership requires sponsor approval",
                ));
            }
        }

        Ok(vec![MembershipEvent::Approved(MembershipApproved {
            membership_id: self.id,
            person_id: cmd.person_id,
            group_id: cmd.group_id,
            sponsor: None,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveMembership) -> Result<Vec<MembershipEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_not_removed()?;

        if cmd.actor_role < MembershipRole::Sponsor {
            return Err(DomainError::forbidden(
                "approving requests requires at least the sponsor role",
            ));
        }

        if self.status == MembershipStatus::Approved {
            return Err(DomainError::AlreadyMember);
        }

        Ok(vec![MembershipEvent::Approved(MembershipApproved {
            membership_id: self.id,
            person_id: self.person_id,
            group_id: self.group_id,
            sponsor: Some(cmd.actor),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke(&self, cmd: &RevokeMembership) -> Result<Vec<MembershipEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_not_removed()?;

        let self_removal = cmd.actor == self.person_id;

        if self_removal {
            if !cmd.rules.self_removal {
                return Err(DomainError::forbidden(
                    "group does not allow voluntary removal",
                ));
            }
        } else if cmd.actor_role < MembershipRole::Administrator {
            return Err(DomainError::forbidden(
                "revoking a membership requires the administrator role",
            ));
        }

        Ok(vec![MembershipEvent::Revoked(MembershipRevoked {
            membership_id: self.id,
            person_id: self.person_id,
            group_id: self.group_id,
            self_removal,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_role(&self, cmd: &ChangeRole) -> Result<Vec<MembershipEvent>, DomainError> {
        self.ensure_exists()?;

        if self.status != MembershipStatus::Approved {
            return Err(DomainError::invariant(
                "role changes require an approved membership",
            ));
        }

        if cmd.new_role == self.role {
            return Err(DomainError::validation("role unchanged"));
        }

        // An administrator may assign any role; anyone else must outrank both
        // the member's current role and the role being assigned.
        let allowed = cmd.actor_role == MembershipRole::Administrator
            || (cmd.actor_role > self.role && cmd.actor_role > cmd.new_role);
        if !allowed {
            return Err(DomainError::forbidden(
                "changing this role requires outranking both current and target roles",
            ));
        }

        let mut events = Vec::with_capacity(2);
        if cmd.new_role > self.role {
            events.push(MembershipEvent::RoleUpgraded(RoleUpgraded {
                membership_id: self.id,
                person_id: self.person_id,
                group_id: self.group_id,
                previous: self.role,
                role: cmd.new_role,
                occurred_at: cmd.occurred_at,
            }));
        } else {
            events.push(MembershipEvent::RoleDowngraded(RoleDowngraded {
                membership_id: self.id,
                person_id: self.person_id,
                group_id: self.group_id,
                previous: self.role,
                role: cmd.new_role,
                occurred_at: cmd.occurred_at,
            }));
        }

        if cmd.new_role == MembershipRole::Administrator {
            events.push(MembershipEvent::AdminChanged(AdminChanged {
                group_id: self.group_id,
                previous_admin: cmd.previous_admin,
                new_admin: self.person_id,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Appliers
    // ─────────────────────────────────────────────────────────────────────────

    fn apply_requested(&mut self, e: &MembershipRequested) {
        self.person_id = e.person_id;
        self.group_id = e.group_id;
        self.role = MembershipRole::User;
        self.status = MembershipStatus::Pending;
        self.created = true;
    }

    fn apply_approved(&mut self, e: &MembershipApproved) {
        if !self.created {
            // Direct join: the record starts here, at the base role.
            self.person_id = e.person_id;
            self.group_id = e.group_id;
            self.role = MembershipRole::User;
            self.created = true;
        }
        self.status = MembershipStatus::Approved;
        self.sponsor = e.sponsor;
    }

    fn apply_revoked(&mut self, _e: &MembershipRevoked) {
        self.status = MembershipStatus::Removed;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
