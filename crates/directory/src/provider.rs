//! Persistence-provider contract.
//!
//! Lookups are keyed by explicit enums rather than stringly field names, so
//! an unknown key is unrepresentable instead of a runtime failure.

use std::collections::HashMap;
use std::sync::RwLock;

use accord_core::{DomainError, DomainResult, ExpectedVersion, GroupId, PersonId};
use accord_membership::{Membership, MembershipStatus};

use crate::api_token::AccountPermission;
use crate::group::Group;
use crate::person::Person;

/// Lookup key for a person record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonKey {
    Id(PersonId),
    Username(String),
    Email(String),
    /// Outstanding account-confirmation token.
    EmailToken(String),
    /// Outstanding password-reset token.
    PasswordToken(String),
}

/// Lookup key for a group record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    Id(GroupId),
    Name(String),
}

/// Read side of the directory store.
///
/// A snapshot view: implementations answer from whatever transaction/request
/// scope the caller established. No method mutates.
pub trait DirectoryProvider {
    fn person_by(&self, key: &PersonKey) -> Option<Person>;

    fn group_by(&self, key: &GroupKey) -> Option<Group>;

    fn membership(&self, person_id: PersonId, group_id: GroupId) -> Option<Membership>;

    /// All membership records for a person, any status.
    fn memberships_of(&self, person_id: PersonId) -> Vec<Membership>;

    fn memberships_by_status(
        &self,
        status: MembershipStatus,
        group_ids: &[GroupId],
    ) -> Vec<Membership>;

    fn account_permission_by_token(&self, token: &str) -> Option<AccountPermission>;
}

/// Write side of the directory store.
pub trait DirectoryRegister {
    fn save_person(&self, person: &Person) -> DomainResult<()>;

    fn save_group(&self, group: &Group) -> DomainResult<()>;

    /// Persist a membership, enforcing the optimistic-concurrency check
    /// against the stored record's version.
    fn save_membership(
        &self,
        membership: &Membership,
        expected: ExpectedVersion,
    ) -> DomainResult<()>;

    /// Fails with a conflict when the token string already exists; callers
    /// regenerate and retry.
    fn insert_account_permission(&self, permission: &AccountPermission) -> DomainResult<()>;

    fn remove_account_permission(&self, token: &str) -> DomainResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory implementation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Store {
    people: HashMap<PersonId, Person>,
    groups: HashMap<GroupId, Group>,
    memberships: HashMap<(PersonId, GroupId), Membership>,
    tokens: HashMap<String, AccountPermission>,
}

/// In-memory directory for tests/dev.
///
/// Explicitly constructed and passed by reference; there is deliberately no
/// process-wide instance. Interior locking only makes the handle shareable
/// across threads, it is not a transaction model.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: RwLock<Store>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DirectoryProvider for InMemoryDirectory {
    fn person_by(&self, key: &PersonKey) -> Option<Person> {
        let store = self.inner.read().ok()?;
        match key {
            PersonKey::Id(id) => store.people.get(id).cloned(),
            PersonKey::Username(username) => store
                .people
                .values()
                .find(|p| p.username == *username)
                .cloned(),
            PersonKey::Email(email) => {
                store.people.values().find(|p| p.email == *email).cloned()
            }
            PersonKey::EmailToken(token) => store
                .people
                .values()
                .find(|p| p.email_token.as_deref() == Some(token))
                .cloned(),
            PersonKey::PasswordToken(token) => store
                .people
                .values()
                .find(|p| p.password_token.as_deref() == Some(token))
                .cloned(),
        }
    }

    fn group_by(&self, key: &GroupKey) -> Option<Group> {
        let store = self.inner.read().ok()?;
        match key {
            GroupKey::Id(id) => store.groups.get(id).cloned(),
            GroupKey::Name(name) => store.groups.values().find(|g| g.name == *name).cloned(),
        }
    }

    fn membership(&self, person_id: PersonId, group_id: GroupId) -> Option<Membership> {
        let store = self.inner.read().ok()?;
        store.memberships.get(&(person_id, group_id)).cloned()
    }

    fn memberships_of(&self, person_id: PersonId) -> Vec<Membership> {
        let Ok(store) = self.inner.read() else {
            return Vec::new();
        };
        store
            .memberships
            .values()
            .filter(|m| m.person_id == person_id)
            .cloned()
            .collect()
    }

    fn memberships_by_status(
        &self,
        status: MembershipStatus,
        group_ids: &[GroupId],
    ) -> Vec<Membership> {
        let Ok(store) = self.inner.read() else {
            return Vec::new();
        };
        store
            .memberships
            .values()
            .filter(|m| m.status == status && group_ids.contains(&m.group_id))
            .cloned()
            .collect()
    }

    fn account_permission_by_token(&self, token: &str) -> Option<AccountPermission> {
        let store = self.inner.read().ok()?;
        store.tokens.get(token).cloned()
    }
}

impl DirectoryRegister for InMemoryDirectory {
    fn save_person(&self, person: &Person) -> DomainResult<()> {
        let mut store = self
            .inner
            .write()
            .map_err(|_| DomainError::conflict("directory store poisoned"))?;

        let taken = store.people.values().any(|p| {
            p.id != person.id && (p.username == person.username || p.email == person.email)
        });
        if taken {
            return Err(DomainError::conflict("username or email already registered"));
        }

        store.people.insert(person.id, person.clone());
        Ok(())
    }

    fn save_group(&self, group: &Group) -> DomainResult<()> {
        let mut store = self
            .inner
            .write()
            .map_err(|_| DomainError::conflict("directory store poisoned"))?;

        if store
            .groups
            .values()
            .any(|g| g.id != group.id && g.name == group.name)
        {
            return Err(DomainError::conflict("group name already registered"));
        }

        store.groups.insert(group.id, group.clone());
        Ok(())
    }

    fn save_membership(
        &self,
        membership: &Membership,
        expected: ExpectedVersion,
    ) -> DomainResult<()> {
        let mut store = self
            .inner
            .write()
            .map_err(|_| DomainError::conflict("directory store poisoned"))?;

        let key = (membership.person_id, membership.group_id);
        let baseline = match store.memberships.get(&key) {
            Some(stored) if stored.id == membership.id => stored.version,
            // A removed record may be superseded by a fresh one (rejoin);
            // the new record starts its own version sequence.
            Some(stored) if stored.status.is_terminal() => 0,
            Some(_) => {
                return Err(DomainError::conflict(
                    "another live membership exists for this person and group",
                ));
            }
            None => 0,
        };
        expected.check(baseline)?;

        store.memberships.insert(key, membership.clone());
        Ok(())
    }

    fn insert_account_permission(&self, permission: &AccountPermission) -> DomainResult<()> {
        let mut store = self
            .inner
            .write()
            .map_err(|_| DomainError::conflict("directory store poisoned"))?;

        if store.tokens.contains_key(&permission.token) {
            return Err(DomainError::conflict("token already exists"));
        }

        store
            .tokens
            .insert(permission.token.clone(), permission.clone());
        Ok(())
    }

    fn remove_account_permission(&self, token: &str) -> DomainResult<()> {
        let mut store = self
            .inner
            .write()
            .map_err(|_| DomainError::conflict("directory store poisoned"))?;

        match store.tokens.remove(token) {
            Some(_) => Ok(()),
            None => Err(DomainError::NotFound),
        }
    }
}
