use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accord_core::{GroupId, PersonId};
use accord_events::Event;
use accord_membership::GroupRules;

/// A group record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub display_name: Option<String>,
    pub owner_id: PersonId,
    pub group_type: Option<String>,
    pub parent_group: Option<GroupId>,
    /// Mailing address notifications about the group go to, when set.
    pub mailing_list: Option<String>,
    pub self_removal: bool,
    pub need_approval: bool,
    pub invite_only: bool,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(
        id: GroupId,
        name: impl Into<String>,
        owner_id: PersonId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            display_name: None,
            owner_id,
            group_type: None,
            parent_group: None,
            mailing_list: None,
            self_removal: true,
            need_approval: false,
            invite_only: false,
            created_at,
        }
    }

    /// Policy snapshot membership commands are evaluated against.
    pub fn rules(&self) -> GroupRules {
        GroupRules {
            self_removal: self.self_removal,
            need_approval: self.need_approval,
            invite_only: self.invite_only,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// One edited field, already rendered for display in notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub value: String,
}

/// Event emitted when a group is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCreated {
    pub group_id: GroupId,
    pub creator: PersonId,
    pub occurred_at: DateTime<Utc>,
}

/// Event emitted when group information is edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEdited {
    pub group_id: GroupId,
    pub editor: PersonId,
    pub changes: Vec<FieldChange>,
    pub occurred_at: DateTime<Utc>,
}

/// All group events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEvent {
    Created(GroupCreated),
    Edited(GroupEdited),
}

impl Event for GroupEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GroupEvent::Created(_) => "group.created",
            GroupEvent::Edited(_) => "group.edited",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GroupEvent::Created(e) => e.occurred_at,
            GroupEvent::Edited(e) => e.occurred_at,
        }
    }
}
