//! Request-scoped security surface.
//!
//! `SecurityContext` is what the web layer talks to: it borrows a directory
//! provider, the security configuration and an event bus for the lifetime of
//! one request, carries the authenticated identity (if any), and exposes the
//! membership operations and authorization checks. There is deliberately no
//! process-wide state; every context is explicitly constructed.

use std::collections::BTreeSet;
use std::env;

use chrono::Utc;

use accord_core::{
    DomainError, DomainResult, ExpectedVersion, GroupId, MembershipId, PersonId,
};
use accord_directory::{
    AccountPermission, AccountPermissionLevel, AccountStatus, DirectoryProvider,
    DirectoryRegister, FieldChange, Group, GroupCreated, GroupEdited, GroupEvent, GroupKey,
    Person, PersonKey,
};
use accord_events::{EventBus, execute};
use accord_membership::{
    ApproveMembership, ChangeRole, JoinGroup, Membership, MembershipCommand, MembershipRole,
    MembershipStatus, RequestMembership, RevokeMembership,
};

use crate::acl::{AclAction, AclPrincipal, root_acl};
use crate::events::{AccountEvent, DomainEvent};
use crate::login::{LoginStatus, process_login};
use crate::password::hash_password;
use crate::token::{DEFAULT_TOKEN_ENTROPY, TokenGrant, generate_token, unique_token,
    validate_token};

/// Names of the specially-privileged groups.
///
/// Configured, never hard-coded: belonging to `admin_group` makes an account
/// a system-wide administrator, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    pub admin_group: String,
    pub modo_group: String,
    pub group_editor_group: String,
}

impl SecurityConfig {
    pub fn new(
        admin_group: impl Into<String>,
        modo_group: impl Into<String>,
        group_editor_group: impl Into<String>,
    ) -> Self {
        Self {
            admin_group: admin_group.into(),
            modo_group: modo_group.into(),
            group_editor_group: group_editor_group.into(),
        }
    }

    /// Read the group names from `ACCORD_*` environment variables, with
    /// defaults suitable for development.
    pub fn from_env() -> Self {
        Self {
            admin_group: env::var("ACCORD_ADMIN_GROUP").unwrap_or_else(|_| "admins".to_string()),
            modo_group: env::var("ACCORD_MODO_GROUP")
                .unwrap_or_else(|_| "moderators".to_string()),
            group_editor_group: env::var("ACCORD_GROUP_EDITOR_GROUP")
                .unwrap_or_else(|_| "group-editors".to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization resolver (pure reads)
// ─────────────────────────────────────────────────────────────────────────────

/// Whether the person holds an approved membership in the named group.
pub fn is_member_of<P>(provider: &P, person_id: PersonId, group_name: &str) -> bool
where
    P: DirectoryProvider + ?Sized,
{
    let Some(group) = provider.group_by(&GroupKey::Name(group_name.to_string())) else {
        return false;
    };
    tracing::debug!(group = %group.name, %person_id, "checking group membership");
    provider
        .membership(person_id, group.id)
        .is_some_and(|m| m.status == MembershipStatus::Approved)
}

/// The person's effective role in the group.
///
/// Only an approved membership carries a role; pending or removed records
/// count as `Unknown` regardless of the stored role value.
pub fn group_role<P>(provider: &P, person_id: PersonId, group_id: GroupId) -> MembershipRole
where
    P: DirectoryProvider + ?Sized,
{
    provider
        .membership(person_id, group_id)
        .filter(|m| m.status == MembershipStatus::Approved)
        .map(|m| m.role)
        .unwrap_or(MembershipRole::Unknown)
}

pub fn is_group_admin<P>(provider: &P, person_id: PersonId, group_id: GroupId) -> bool
where
    P: DirectoryProvider + ?Sized,
{
    group_role(provider, person_id, group_id) >= MembershipRole::Administrator
}

pub fn is_group_sponsor<P>(provider: &P, person_id: PersonId, group_id: GroupId) -> bool
where
    P: DirectoryProvider + ?Sized,
{
    group_role(provider, person_id, group_id) >= MembershipRole::Sponsor
}

// ─────────────────────────────────────────────────────────────────────────────
// Request-scoped context
// ─────────────────────────────────────────────────────────────────────────────

/// One request's security context.
pub struct SecurityContext<'a, P, B> {
    provider: &'a P,
    config: &'a SecurityConfig,
    bus: &'a B,
    authenticated: Option<Person>,
}

impl<'a, P, B> SecurityContext<'a, P, B> {
    /// An anonymous (unauthenticated) context.
    pub fn new(provider: &'a P, config: &'a SecurityConfig, bus: &'a B) -> Self {
        Self {
            provider,
            config,
            bus,
            authenticated: None,
        }
    }

    /// Attach the authenticated person for this request.
    pub fn with_identity(mut self, person: Person) -> Self {
        self.authenticated = Some(person);
        self
    }

    pub fn identity(&self) -> Option<&Person> {
        self.authenticated.as_ref()
    }

    fn current(&self) -> DomainResult<&Person> {
        self.authenticated.as_ref().ok_or(DomainError::Unauthorized)
    }
}

// Read-only checks: anything here is a pure function of the directory
// snapshot and the identity.
impl<'a, P, B> SecurityContext<'a, P, B>
where
    P: DirectoryProvider,
{
    pub fn authenticated_is_admin(&self) -> bool {
        self.authenticated
            .as_ref()
            .is_some_and(|p| is_member_of(self.provider, p.id, &self.config.admin_group))
    }

    pub fn authenticated_is_modo(&self) -> bool {
        self.authenticated
            .as_ref()
            .is_some_and(|p| is_member_of(self.provider, p.id, &self.config.modo_group))
    }

    pub fn authenticated_is_group_editor(&self) -> bool {
        self.authenticated
            .as_ref()
            .is_some_and(|p| is_member_of(self.provider, p.id, &self.config.group_editor_group))
    }

    pub fn authenticated_is_group_admin(&self, group_id: GroupId) -> bool {
        self.authenticated
            .as_ref()
            .is_some_and(|p| is_group_admin(self.provider, p.id, group_id))
    }

    pub fn authenticated_is_group_sponsor(&self, group_id: GroupId) -> bool {
        self.authenticated
            .as_ref()
            .is_some_and(|p| is_group_sponsor(self.provider, p.id, group_id))
    }

    /// Whether `person_id` already has a pending request for the group.
    pub fn requested_membership(&self, group_id: GroupId, person_id: PersonId) -> bool {
        self.provider
            .membership(person_id, group_id)
            .is_some_and(|m| m.status == MembershipStatus::Pending)
    }

    /// Pending requests in every group where the current user may approve
    /// (role >= sponsor).
    pub fn pending_membership_requests(&self) -> Vec<Membership> {
        let Some(person) = self.authenticated.as_ref() else {
            return Vec::new();
        };

        let groups: Vec<GroupId> = self
            .provider
            .memberships_of(person.id)
            .into_iter()
            .filter(|m| {
                m.status == MembershipStatus::Approved && m.role >= MembershipRole::Sponsor
            })
            .map(|m| m.group_id)
            .collect();

        tracing::debug!(
            count = groups.len(),
            "groups where the current user can manage membership requests"
        );

        if groups.is_empty() {
            return Vec::new();
        }

        self.provider
            .memberships_by_status(MembershipStatus::Pending, &groups)
    }

    /// Resolved set of allowed actions for the current identity.
    pub fn effective_capabilities(&self) -> BTreeSet<AclAction> {
        let username = self.authenticated.as_ref().map(|p| p.username.as_str());
        let acl = root_acl(username, self.config);
        acl.effective_capabilities(&self.principals())
    }

    /// Validate an API token and require a permission tier.
    pub fn authorize_api(
        &self,
        token: &str,
        required: AccountPermissionLevel,
    ) -> DomainResult<TokenGrant> {
        let grant = validate_token(self.provider, token)?;
        if !grant.permissions.satisfies(required) {
            return Err(DomainError::forbidden(
                "API key permission level is insufficient",
            ));
        }
        Ok(grant)
    }

    /// The principals the current identity acts as: everyone, the user
    /// itself when authenticated, and one principal per approved group.
    fn principals(&self) -> Vec<AclPrincipal> {
        let mut principals = vec![AclPrincipal::Everyone];

        let Some(person) = self.authenticated.as_ref() else {
            return principals;
        };
        principals.push(AclPrincipal::User(person.username.clone()));

        for membership in self.provider.memberships_of(person.id) {
            if membership.status != MembershipStatus::Approved {
                continue;
            }
            if let Some(group) = self.provider.group_by(&GroupKey::Id(membership.group_id)) {
                principals.push(AclPrincipal::Group(group.name));
            }
        }

        principals
    }

    fn group(&self, group_id: GroupId) -> DomainResult<Group> {
        self.provider
            .group_by(&GroupKey::Id(group_id))
            .ok_or(DomainError::NotFound)
    }
}

// Mutations: membership transitions, account lifecycle, token issuance.
// Everything saves through the register first and publishes afterwards;
// publish failures are logged, not propagated (notification dispatch is
// fire-and-forget).
impl<'a, P, B> SecurityContext<'a, P, B>
where
    P: DirectoryProvider + DirectoryRegister,
    B: EventBus<DomainEvent>,
{
    // ─────────────────────────────────────────────────────────────────────────
    // Account lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a new person. The account stays `Pending` until the emailed
    /// confirmation token is redeemed.
    pub fn register_person(
        &self,
        username: &str,
        fullname: &str,
        email: &str,
        password: &str,
    ) -> DomainResult<Person> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DomainError::validation("username cannot be empty"));
        }
        if fullname.trim().is_empty() {
            return Err(DomainError::validation("full name cannot be empty"));
        }
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("invalid email address"));
        }

        let mut person = Person::new(
            PersonId::new(),
            username,
            fullname.trim(),
            email,
            hash_password(password)?,
            Utc::now(),
        );
        person.email_token = Some(generate_token(32));

        self.provider.save_person(&person)?;
        tracing::debug!(username = %person.username, "person registered, confirmation pending");

        self.publish([DomainEvent::Account(AccountEvent::Registered {
            person_id: person.id,
            occurred_at: Utc::now(),
        })]);

        Ok(person)
    }

    /// Redeem a confirmation token: Pending → Active.
    pub fn confirm_account(&self, token: &str) -> DomainResult<Person> {
        let mut person = self
            .provider
            .person_by(&PersonKey::EmailToken(token.to_string()))
            .ok_or(DomainError::NotFound)?;

        person.status = AccountStatus::Active;
        person.email_token = None;
        self.provider.save_person(&person)?;

        tracing::debug!(username = %person.username, "account confirmed");
        Ok(person)
    }

    /// Evaluate a login attempt for `username` and publish the audit events.
    pub fn login(&self, username: &str, password: &str) -> DomainResult<LoginStatus> {
        let person = self
            .provider
            .person_by(&PersonKey::Username(username.to_string()));

        let (status, events) = process_login(username, person.as_ref(), password, Utc::now())?;

        match status {
            LoginStatus::Succeed => tracing::debug!(%username, "login succeeded"),
            LoginStatus::PendingAccount => {
                tracing::debug!(%username, "login refused, account not yet confirmed");
            }
            LoginStatus::FailedLockedAccount => {
                tracing::debug!(%username, "login refused, account is blocked");
            }
            LoginStatus::Failed => tracing::debug!(%username, "login failed"),
        }

        self.publish(events.into_iter().map(DomainEvent::from));
        Ok(status)
    }

    /// Issue a password-reset token and announce it (drives the reset email).
    pub fn request_password_reset(&self, username: &str) -> DomainResult<()> {
        let mut person = self
            .provider
            .person_by(&PersonKey::Username(username.to_string()))
            .ok_or(DomainError::NotFound)?;

        person.password_token = Some(generate_token(32));
        self.provider.save_person(&person)?;

        self.publish([DomainEvent::Account(AccountEvent::PasswordResetRequested {
            person_id: person.id,
            occurred_at: Utc::now(),
        })]);

        Ok(())
    }

    /// Redeem a reset token and store the new password hash.
    pub fn reset_password(&self, token: &str, new_password: &str) -> DomainResult<()> {
        let mut person = self
            .provider
            .person_by(&PersonKey::PasswordToken(token.to_string()))
            .ok_or(DomainError::NotFound)?;

        person.password_hash = hash_password(new_password)?;
        person.password_token = None;
        self.provider.save_person(&person)?;

        tracing::debug!(username = %person.username, "password reset completed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Membership operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Self-service join at approved status (groups without approval policy).
    pub fn join_group(&self, group_id: GroupId) -> DomainResult<Membership> {
        let person_id = self.current()?.id;
        let group = self.group(group_id)?;
        let administrative = self.authenticated_is_admin();

        let (membership, baseline) = self.membership_baseline(person_id, group_id);
        self.run_membership(
            membership,
            baseline,
            MembershipCommand::Join(JoinGroup {
                person_id,
                group_id,
                rules: group.rules(),
                administrative,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Administrative force-join of another person.
    pub fn force_join(&self, group_id: GroupId, person_id: PersonId) -> DomainResult<Membership> {
        self.current()?;
        if !self.authenticated_is_admin() && !self.authenticated_is_group_admin(group_id) {
            return Err(DomainError::forbidden(
                "force-joining requires group or account administration rights",
            ));
        }
        let group = self.group(group_id)?;

        let (membership, baseline) = self.membership_baseline(person_id, group_id);
        self.run_membership(
            membership,
            baseline,
            MembershipCommand::Join(JoinGroup {
                person_id,
                group_id,
                rules: group.rules(),
                administrative: true,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// File a membership request (status Pending until approved).
    pub fn request_membership(&self, group_id: GroupId) -> DomainResult<Membership> {
        let person_id = self.current()?.id;
        let group = self.group(group_id)?;

        let (membership, baseline) = self.membership_baseline(person_id, group_id);
        self.run_membership(
            membership,
            baseline,
            MembershipCommand::Request(RequestMembership {
                person_id,
                group_id,
                rules: group.rules(),
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Approve a pending request (requires role >= sponsor in the group).
    pub fn approve_membership(
        &self,
        group_id: GroupId,
        person_id: PersonId,
    ) -> DomainResult<Membership> {
        let (actor, actor_role) = self.actor_role(group_id)?;
        let (membership, baseline) = self.existing_membership(person_id, group_id)?;

        self.run_membership(
            membership,
            baseline,
            MembershipCommand::Approve(ApproveMembership {
                actor,
                actor_role,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Revoke a membership: voluntary exit for the member themselves (policy
    /// permitting), administrative removal otherwise.
    pub fn revoke_membership(
        &self,
        group_id: GroupId,
        person_id: PersonId,
        reason: Option<String>,
    ) -> DomainResult<Membership> {
        let (actor, actor_role) = self.actor_role(group_id)?;
        let group = self.group(group_id)?;
        let (membership, baseline) = self.existing_membership(person_id, group_id)?;

        self.run_membership(
            membership,
            baseline,
            MembershipCommand::Revoke(RevokeMembership {
                actor,
                actor_role,
                rules: group.rules(),
                reason,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Change a member's role on the ordered scale.
    pub fn change_role(
        &self,
        group_id: GroupId,
        person_id: PersonId,
        new_role: MembershipRole,
    ) -> DomainResult<Membership> {
        let (actor, actor_role) = self.actor_role(group_id)?;
        let (membership, baseline) = self.existing_membership(person_id, group_id)?;

        let previous_admin = self
            .provider
            .memberships_by_status(MembershipStatus::Approved, &[group_id])
            .into_iter()
            .find(|m| m.role == MembershipRole::Administrator)
            .map(|m| m.person_id);

        self.run_membership(
            membership,
            baseline,
            MembershipCommand::ChangeRole(ChangeRole {
                actor,
                actor_role,
                new_role,
                previous_admin,
                occurred_at: Utc::now(),
            }),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Groups
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a group owned by the current user (admins and group editors).
    pub fn create_group(&self, name: &str) -> DomainResult<Group> {
        let person = self.current()?;
        if !self.authenticated_is_admin() && !self.authenticated_is_group_editor() {
            return Err(DomainError::forbidden(
                "creating groups requires group-editor rights",
            ));
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("group name cannot be empty"));
        }

        let group = Group::new(GroupId::new(), name, person.id, Utc::now());
        self.provider.save_group(&group)?;

        self.publish([DomainEvent::Group(GroupEvent::Created(GroupCreated {
            group_id: group.id,
            creator: person.id,
            occurred_at: Utc::now(),
        }))]);

        Ok(group)
    }

    /// Apply edited group information, announcing the changed fields.
    ///
    /// Editing is allowed for the group's administrators, group editors and
    /// account administrators. A no-op edit emits nothing.
    pub fn edit_group(&self, updated: Group) -> DomainResult<Vec<FieldChange>> {
        let editor = self.current()?.id;
        let existing = self.group(updated.id)?;

        let may_edit = self.authenticated_is_admin()
            || self.authenticated_is_group_editor()
            || self.authenticated_is_group_admin(existing.id);
        if !may_edit {
            return Err(DomainError::forbidden(
                "editing this group requires administration rights",
            ));
        }

        let changes = diff_group(&existing, &updated);
        if changes.is_empty() {
            return Ok(changes);
        }

        self.provider.save_group(&updated)?;
        self.publish([DomainEvent::Group(GroupEvent::Edited(GroupEdited {
            group_id: updated.id,
            editor,
            changes: changes.clone(),
            occurred_at: Utc::now(),
        }))]);

        Ok(changes)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API tokens
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue an API token for the current user.
    ///
    /// Generation retries on the (negligible) chance of a token collision;
    /// the store's unique constraint is the final arbiter.
    pub fn grant_api_token(
        &self,
        application: &str,
        permissions: AccountPermissionLevel,
    ) -> DomainResult<AccountPermission> {
        let person_id = self.current()?.id;

        loop {
            let grant = AccountPermission {
                token: unique_token(self.provider, DEFAULT_TOKEN_ENTROPY),
                person_id,
                application: application.to_string(),
                permissions,
                granted_on: Utc::now(),
            };

            match self.provider.insert_account_permission(&grant) {
                Ok(()) => return Ok(grant),
                Err(DomainError::Conflict(_)) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Destroy an API token (its owner, or an account administrator).
    pub fn revoke_api_token(&self, token: &str) -> DomainResult<()> {
        let person = self.current()?;
        let grant = self
            .provider
            .account_permission_by_token(token)
            .ok_or(DomainError::NotFound)?;

        if grant.person_id != person.id && !self.authenticated_is_admin() {
            return Err(DomainError::forbidden(
                "only the token owner or an administrator may revoke it",
            ));
        }

        self.provider.remove_account_permission(token)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// The acting person and their effective role for decisions in `group_id`.
    /// Account administrators act with the administrator role everywhere.
    fn actor_role(&self, group_id: GroupId) -> DomainResult<(PersonId, MembershipRole)> {
        let person = self.current()?;
        let role = if self.authenticated_is_admin() {
            MembershipRole::Administrator
        } else {
            group_role(self.provider, person.id, group_id)
        };
        Ok((person.id, role))
    }

    /// Load the live membership to continue, or start a fresh record when
    /// none (or only a removed one) exists.
    fn membership_baseline(&self, person_id: PersonId, group_id: GroupId) -> (Membership, u64) {
        match self.provider.membership(person_id, group_id) {
            Some(m) if !m.status.is_terminal() => {
                let baseline = m.version;
                (m, baseline)
            }
            _ => (
                Membership::empty(MembershipId::new(), person_id, group_id),
                0,
            ),
        }
    }

    fn existing_membership(
        &self,
        person_id: PersonId,
        group_id: GroupId,
    ) -> DomainResult<(Membership, u64)> {
        let m = self
            .provider
            .membership(person_id, group_id)
            .ok_or(DomainError::NotFound)?;
        let baseline = m.version;
        Ok((m, baseline))
    }

    /// Decide, save with a compare-and-swap on the loaded version, publish.
    fn run_membership(
        &self,
        mut membership: Membership,
        baseline: u64,
        command: MembershipCommand,
    ) -> DomainResult<Membership> {
        let events = execute(&mut membership, &command)?;
        if events.is_empty() {
            // Idempotent command (e.g. re-request while pending): nothing
            // changed, nothing to save or announce.
            return Ok(membership);
        }

        self.provider
            .save_membership(&membership, ExpectedVersion::Exact(baseline))?;
        self.publish(events.into_iter().map(DomainEvent::from));
        Ok(membership)
    }

    fn publish(&self, events: impl IntoIterator<Item = DomainEvent>) {
        for event in events {
            if let Err(err) = self.bus.publish(event) {
                tracing::warn!(error = ?err, "failed to enqueue notification event");
            }
        }
    }
}

/// Field-by-field diff of the editable group attributes, rendered for
/// notification bodies.
fn diff_group(before: &Group, after: &Group) -> Vec<FieldChange> {
    fn push(changes: &mut Vec<FieldChange>, field: &str, old: &str, new: String) {
        if old != new {
            changes.push(FieldChange {
                field: field.to_string(),
                value: new,
            });
        }
    }

    let opt = |v: &Option<String>| v.clone().unwrap_or_default();

    let mut changes = Vec::new();
    push(&mut changes, "name", &before.name, after.name.clone());
    push(
        &mut changes,
        "display name",
        &opt(&before.display_name),
        opt(&after.display_name),
    );
    push(
        &mut changes,
        "group type",
        &opt(&before.group_type),
        opt(&after.group_type),
    );
    push(
        &mut changes,
        "mailing list",
        &opt(&before.mailing_list),
        opt(&after.mailing_list),
    );
    push(
        &mut changes,
        "self removal",
        &before.self_removal.to_string(),
        after.self_removal.to_string(),
    );
    push(
        &mut changes,
        "requires approval",
        &before.need_approval.to_string(),
        after.need_approval.to_string(),
    );
    push(
        &mut changes,
        "invite only",
        &before.invite_only.to_string(),
        after.invite_only.to_string(),
    );
    changes
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use accord_directory::InMemoryDirectory;
    use accord_events::{InMemoryEventBus, Subscription};
    use accord_membership::MembershipEvent;

    type Bus = InMemoryEventBus<DomainEvent>;

    struct Fixture {
        dir: InMemoryDirectory,
        bus: Bus,
        config: SecurityConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: InMemoryDirectory::new(),
                bus: Bus::new(),
                config: SecurityConfig::new("admins", "moderators", "group-editors"),
            }
        }

        fn ctx(&self) -> SecurityContext<'_, InMemoryDirectory, Bus> {
            SecurityContext::new(&self.dir, &self.config, &self.bus)
        }

        fn ctx_as(&self, person: &Person) -> SecurityContext<'_, InMemoryDirectory, Bus> {
            self.ctx().with_identity(person.clone())
        }

        fn active_person(&self, username: &str, password: &str) -> Person {
            let mut person = Person::new(
                PersonId::new(),
                username,
                format!("{username} Fullname"),
                format!("{username}@example.org"),
                hash_password(password).unwrap(),
                Utc::now(),
            );
            person.status = AccountStatus::Active;
            self.dir.save_person(&person).unwrap();
            person
        }

        fn group(&self, name: &str, owner: &Person, need_approval: bool) -> Group {
            let mut group = Group::new(GroupId::new(), name, owner.id, Utc::now());
            group.need_approval = need_approval;
            self.dir.save_group(&group).unwrap();
            group
        }

        /// Store an approved membership directly (test seeding).
        fn seed_member(&self, person: &Person, group: &Group, role: MembershipRole) {
            let membership = Membership {
                id: MembershipId::new(),
                person_id: person.id,
                group_id: group.id,
                role,
                status: MembershipStatus::Approved,
                sponsor: None,
                version: 1,
                created: true,
            };
            self.dir
                .save_membership(&membership, ExpectedVersion::Any)
                .unwrap();
        }
    }

    fn drain(sub: &Subscription<DomainEvent>) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        while let Ok(event) = sub.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn membership_lifecycle_scenario() {
        let fx = Fixture::new();
        let sub = fx.bus.subscribe();

        // Registration leaves the account pending; login reports it.
        let ctx = fx.ctx();
        let person = ctx
            .register_person("pval", "Pat Valdez", "pval@example.org", "pw1")
            .unwrap();
        assert_eq!(person.status, AccountStatus::Pending);
        assert_eq!(ctx.login("pval", "pw1").unwrap(), LoginStatus::PendingAccount);

        // Confirmation activates; login now succeeds.
        let token = person.email_token.clone().unwrap();
        let person = ctx.confirm_account(&token).unwrap();
        assert_eq!(person.status, AccountStatus::Active);
        assert_eq!(ctx.login("pval", "pw1").unwrap(), LoginStatus::Succeed);

        // A moderated group with a seeded sponsor.
        let owner = fx.active_person("owner", "pw-owner");
        let group = fx.group("infrastructure", &owner, true);
        let sponsor = fx.active_person("spons", "pw-spons");
        fx.seed_member(&sponsor, &group, MembershipRole::Sponsor);

        // Request goes pending at the base role.
        let membership = fx.ctx_as(&person).request_membership(group.id).unwrap();
        assert_eq!(membership.status, MembershipStatus::Pending);
        assert_eq!(membership.role, MembershipRole::User);

        // The sponsor sees and approves the request.
        let sponsor_ctx = fx.ctx_as(&sponsor);
        let pending = sponsor_ctx.pending_membership_requests();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].person_id, person.id);

        let membership = sponsor_ctx.approve_membership(group.id, person.id).unwrap();
        assert_eq!(membership.status, MembershipStatus::Approved);
        assert_eq!(membership.sponsor, Some(sponsor.id));

        // The member leaves voluntarily (policy allows it).
        let membership = fx
            .ctx_as(&person)
            .revoke_membership(group.id, person.id, None)
            .unwrap();
        assert_eq!(membership.status, MembershipStatus::Removed);

        // Exactly one approval and one revocation crossed the bus, the
        // latter flagged as voluntary.
        let events = drain(&sub);
        let approvals: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, DomainEvent::Membership(MembershipEvent::Approved(_))))
            .collect();
        assert_eq!(approvals.len(), 1);

        let revocations: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                DomainEvent::Membership(MembershipEvent::Revoked(r)) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(revocations.len(), 1);
        assert!(revocations[0].self_removal);
    }

    #[test]
    fn login_publishes_audit_events() {
        let fx = Fixture::new();
        let sub = fx.bus.subscribe();
        fx.active_person("mara", "pw1");

        fx.ctx().login("mara", "wrong").unwrap();

        let events = drain(&sub);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            DomainEvent::Account(AccountEvent::LoginRequested { .. })
        ));
        assert!(matches!(
            events[1],
            DomainEvent::Account(AccountEvent::LoginFailed { .. })
        ));
    }

    #[test]
    fn admin_group_membership_makes_an_admin() {
        let fx = Fixture::new();
        let admin = fx.active_person("root", "pw1");
        let admins = fx.group("admins", &admin, false);
        fx.seed_member(&admin, &admins, MembershipRole::User);

        let ctx = fx.ctx_as(&admin);
        assert!(ctx.authenticated_is_admin());
        assert!(!ctx.authenticated_is_modo());

        let caps = ctx.effective_capabilities();
        assert!(caps.contains(&AclAction::Admin));
        assert!(caps.contains(&AclAction::GroupEdit));
        assert!(caps.contains(&AclAction::View));
    }

    #[test]
    fn anonymous_context_can_only_view() {
        let fx = Fixture::new();
        let caps = fx.ctx().effective_capabilities();
        assert_eq!(caps.into_iter().collect::<Vec<_>>(), vec![AclAction::View]);
    }

    #[test]
    fn group_admin_and_sponsor_checks_require_approved_memberships() {
        let fx = Fixture::new();
        let owner = fx.active_person("owner", "pw1");
        let group = fx.group("docs", &owner, true);
        let person = fx.active_person("ada", "pw1");

        // Pending membership with a high role must not grant anything.
        let membership = Membership {
            id: MembershipId::new(),
            person_id: person.id,
            group_id: group.id,
            role: MembershipRole::Administrator,
            status: MembershipStatus::Pending,
            sponsor: None,
            version: 1,
            created: true,
        };
        fx.dir
            .save_membership(&membership, ExpectedVersion::Any)
            .unwrap();

        let ctx = fx.ctx_as(&person);
        assert!(!ctx.authenticated_is_group_admin(group.id));
        assert!(!ctx.authenticated_is_group_sponsor(group.id));
        assert!(ctx.requested_membership(group.id, person.id));
    }

    #[test]
    fn join_respects_need_approval_unless_admin() {
        let fx = Fixture::new();
        let owner = fx.active_person("owner", "pw1");
        let moderated = fx.group("moderated", &owner, true);
        let person = fx.active_person("ada", "pw1");

        let result = fx.ctx_as(&person).join_group(moderated.id);
        assert!(matches!(result, Err(DomainError::Forbidden(_))));

        // An account administrator can join directly.
        let admins = fx.group("admins", &owner, false);
        fx.seed_member(&owner, &admins, MembershipRole::User);
        let membership = fx.ctx_as(&owner).join_group(moderated.id).unwrap();
        assert_eq!(membership.status, MembershipStatus::Approved);
    }

    #[test]
    fn force_join_requires_privilege() {
        let fx = Fixture::new();
        let owner = fx.active_person("owner", "pw1");
        let group = fx.group("ops", &owner, true);
        let person = fx.active_person("ada", "pw1");
        let bystander = fx.active_person("eve", "pw1");

        let denied = fx.ctx_as(&bystander).force_join(group.id, person.id);
        assert!(matches!(denied, Err(DomainError::Forbidden(_))));

        fx.seed_member(&owner, &group, MembershipRole::Administrator);
        let membership = fx.ctx_as(&owner).force_join(group.id, person.id).unwrap();
        assert_eq!(membership.status, MembershipStatus::Approved);
    }

    #[test]
    fn rerequesting_membership_is_idempotent() {
        let fx = Fixture::new();
        let owner = fx.active_person("owner", "pw1");
        let group = fx.group("docs", &owner, true);
        let person = fx.active_person("ada", "pw1");
        let sub = fx.bus.subscribe();

        let ctx = fx.ctx_as(&person);
        let first = ctx.request_membership(group.id).unwrap();
        let second = ctx.request_membership(group.id).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(drain(&sub).len(), 1);
    }

    #[test]
    fn rejoin_after_removal_starts_a_fresh_record() {
        let fx = Fixture::new();
        let owner = fx.active_person("owner", "pw1");
        let group = fx.group("open", &owner, false);
        let person = fx.active_person("ada", "pw1");

        let ctx = fx.ctx_as(&person);
        let original = ctx.join_group(group.id).unwrap();
        ctx.revoke_membership(group.id, person.id, None).unwrap();

        let rejoined = ctx.join_group(group.id).unwrap();
        assert_ne!(rejoined.id, original.id);
        assert_eq!(rejoined.status, MembershipStatus::Approved);
    }

    #[test]
    fn promoting_to_administrator_announces_the_handover() {
        let fx = Fixture::new();
        let owner = fx.active_person("owner", "pw1");
        let group = fx.group("docs", &owner, true);
        fx.seed_member(&owner, &group, MembershipRole::Administrator);

        let person = fx.active_person("ada", "pw1");
        fx.seed_member(&person, &group, MembershipRole::User);

        let sub = fx.bus.subscribe();
        fx.ctx_as(&owner)
            .change_role(group.id, person.id, MembershipRole::Administrator)
            .unwrap();

        let events = drain(&sub);
        assert_eq!(events.len(), 2);
        let DomainEvent::Membership(MembershipEvent::AdminChanged(e)) = &events[1] else {
            panic!("expected AdminChanged event");
        };
        assert_eq!(e.previous_admin, Some(owner.id));
        assert_eq!(e.new_admin, person.id);
    }

    #[test]
    fn api_token_grant_validate_revoke_cycle() {
        let fx = Fixture::new();
        let person = fx.active_person("ada", "pw1");
        let ctx = fx.ctx_as(&person);

        let grant = ctx
            .grant_api_token("release-tooling", AccountPermissionLevel::CanReadPeopleFullInfo)
            .unwrap();

        let validated = ctx
            .authorize_api(&grant.token, AccountPermissionLevel::CanReadPublicInfo)
            .unwrap();
        assert_eq!(validated.person_id, person.id);

        let too_high = ctx.authorize_api(&grant.token, AccountPermissionLevel::CanEditGroupInfo);
        assert!(matches!(too_high, Err(DomainError::Forbidden(_))));

        // A stranger may not revoke someone else's token.
        let stranger = fx.active_person("eve", "pw1");
        let denied = fx.ctx_as(&stranger).revoke_api_token(&grant.token);
        assert!(matches!(denied, Err(DomainError::Forbidden(_))));

        ctx.revoke_api_token(&grant.token).unwrap();
        assert_eq!(
            ctx.authorize_api(&grant.token, AccountPermissionLevel::CanReadPublicInfo),
            Err(DomainError::Unauthorized)
        );
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        ctx.register_person("ada", "Ada One", "ada@example.org", "pw1")
            .unwrap();

        let dup = ctx.register_person("ada", "Ada Two", "other@example.org", "pw2");
        assert!(matches!(dup, Err(DomainError::Conflict(_))));
    }

    #[test]
    fn password_reset_round_trip() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        fx.active_person("ada", "old-pw");

        ctx.request_password_reset("ada").unwrap();
        let token = fx
            .dir
            .person_by(&PersonKey::Username("ada".into()))
            .unwrap()
            .password_token
            .unwrap();

        ctx.reset_password(&token, "new-pw").unwrap();
        assert_eq!(ctx.login("ada", "old-pw").unwrap(), LoginStatus::Failed);
        assert_eq!(ctx.login("ada", "new-pw").unwrap(), LoginStatus::Succeed);

        // The token is single-use.
        assert_eq!(
            ctx.reset_password(&token, "again"),
            Err(DomainError::NotFound)
        );
    }

    #[test]
    fn group_editing_reports_changed_fields() {
        let fx = Fixture::new();
        let owner = fx.active_person("owner", "pw1");
        let group = fx.group("docs", &owner, false);
        fx.seed_member(&owner, &group, MembershipRole::Administrator);

        let sub = fx.bus.subscribe();
        let ctx = fx.ctx_as(&owner);

        let mut updated = group.clone();
        updated.display_name = Some("Documentation".to_string());
        updated.mailing_list = Some("docs@lists.example.org".to_string());

        let changes = ctx.edit_group(updated.clone()).unwrap();
        assert_eq!(changes.len(), 2);

        // Editing again with the same values is a no-op.
        assert!(ctx.edit_group(updated).unwrap().is_empty());

        let events = drain(&sub);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            DomainEvent::Group(GroupEvent::Edited(_))
        ));

        let outsider = fx.active_person("eve", "pw1");
        let mut sneaky = group.clone();
        sneaky.display_name = Some("Hijacked".to_string());
        assert!(matches!(
            fx.ctx_as(&outsider).edit_group(sneaky),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn create_group_requires_editor_rights() {
        let fx = Fixture::new();
        let person = fx.active_person("ada", "pw1");

        let denied = fx.ctx_as(&person).create_group("new-team");
        assert!(matches!(denied, Err(DomainError::Forbidden(_))));

        let editors = fx.group("group-editors", &person, false);
        fx.seed_member(&person, &editors, MembershipRole::User);

        let group = fx.ctx_as(&person).create_group("new-team").unwrap();
        assert_eq!(group.owner_id, person.id);
        assert_eq!(group.name, "new-team");
    }
}
