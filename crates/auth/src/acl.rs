//! Access-control-list assembly.
//!
//! The root ACL is plain data: an ordered list of allow entries evaluated
//! top-down. There are no deny entries, so a later entry can never revoke
//! what an earlier one granted; the first applicable grant per action wins.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::security::SecurityConfig;

/// Who an ACL entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AclPrincipal {
    Everyone,
    /// A specific authenticated user, by username.
    User(String),
    /// Every member of the named group.
    Group(String),
}

/// Actions the root ACL can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AclAction {
    View,
    Authenticated,
    Admin,
    Moderation,
    GroupEdit,
}

/// One allow entry: the principal may perform each listed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub principal: AclPrincipal,
    pub actions: Vec<AclAction>,
}

impl AclEntry {
    fn new(principal: AclPrincipal, actions: &[AclAction]) -> Self {
        Self {
            principal,
            actions: actions.to_vec(),
        }
    }
}

/// Ordered allow-list evaluated top-down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlList {
    entries: Vec<AclEntry>,
}

impl AccessControlList {
    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    /// Whether any entry grants `action` to one of the caller's principals.
    pub fn grants(&self, principals: &[AclPrincipal], action: AclAction) -> bool {
        self.entries
            .iter()
            .any(|e| e.actions.contains(&action) && principals.contains(&e.principal))
    }

    /// Union of all actions granted to the caller's principals.
    pub fn effective_capabilities(&self, principals: &[AclPrincipal]) -> BTreeSet<AclAction> {
        self.entries
            .iter()
            .filter(|e| principals.contains(&e.principal))
            .flat_map(|e| e.actions.iter().copied())
            .collect()
    }
}

/// Assemble the root ACL for a request.
///
/// Entry order is fixed: everyone may view; the authenticated user gets the
/// `Authenticated` action; the configured admin group gets admin, moderation
/// and group-edit; the group-editor group gets group-edit; the moderator
/// group gets moderation.
pub fn root_acl(authenticated: Option<&str>, config: &SecurityConfig) -> AccessControlList {
    let mut entries = vec![AclEntry::new(AclPrincipal::Everyone, &[AclAction::View])];

    if let Some(username) = authenticated {
        entries.push(AclEntry::new(
            AclPrincipal::User(username.to_string()),
            &[AclAction::Authenticated],
        ));
    }

    entries.push(AclEntry::new(
        AclPrincipal::Group(config.admin_group.clone()),
        &[AclAction::Admin, AclAction::Moderation, AclAction::GroupEdit],
    ));
    entries.push(AclEntry::new(
        AclPrincipal::Group(config.group_editor_group.clone()),
        &[AclAction::GroupEdit],
    ));
    entries.push(AclEntry::new(
        AclPrincipal::Group(config.modo_group.clone()),
        &[AclAction::Moderation],
    ));

    AccessControlList { entries }
}
