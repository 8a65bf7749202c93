//! Account security events and the domain-event umbrella consumed by
//! notification dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accord_core::PersonId;
use accord_directory::GroupEvent;
use accord_events::Event;
use accord_membership::MembershipEvent;

/// Events around account lifecycle and authentication attempts.
///
/// Login events exist for audit logging: `LoginRequested` is emitted before
/// any evaluation, and exactly one of `LoginSucceeded`/`LoginFailed` after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    Registered {
        person_id: PersonId,
        occurred_at: DateTime<Utc>,
    },
    LoginRequested {
        username: String,
        occurred_at: DateTime<Utc>,
    },
    LoginSucceeded {
        person_id: PersonId,
        occurred_at: DateTime<Utc>,
    },
    LoginFailed {
        username: String,
        occurred_at: DateTime<Utc>,
    },
    PasswordResetRequested {
        person_id: PersonId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::Registered { .. } => "account.registered",
            AccountEvent::LoginRequested { .. } => "account.login_requested",
            AccountEvent::LoginSucceeded { .. } => "account.login_succeeded",
            AccountEvent::LoginFailed { .. } => "account.login_failed",
            AccountEvent::PasswordResetRequested { .. } => "account.password_reset_requested",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::Registered { occurred_at, .. }
            | AccountEvent::LoginRequested { occurred_at, .. }
            | AccountEvent::LoginSucceeded { occurred_at, .. }
            | AccountEvent::LoginFailed { occurred_at, .. }
            | AccountEvent::PasswordResetRequested { occurred_at, .. } => *occurred_at,
        }
    }
}

/// Everything the security core publishes, in one bus message type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    Account(AccountEvent),
    Group(GroupEvent),
    Membership(MembershipEvent),
}

impl Event for DomainEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::Account(e) => e.event_type(),
            DomainEvent::Group(e) => e.event_type(),
            DomainEvent::Membership(e) => e.event_type(),
        }
    }

    fn version(&self) -> u32 {
        match self {
            DomainEvent::Account(e) => e.version(),
            DomainEvent::Group(e) => e.version(),
            DomainEvent::Membership(e) => e.version(),
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::Account(e) => e.occurred_at(),
            DomainEvent::Group(e) => e.occurred_at(),
            DomainEvent::Membership(e) => e.occurred_at(),
        }
    }
}

impl From<AccountEvent> for DomainEvent {
    fn from(value: AccountEvent) -> Self {
        DomainEvent::Account(value)
    }
}

impl From<GroupEvent> for DomainEvent {
    fn from(value: GroupEvent) -> Self {
        DomainEvent::Group(value)
    }
}

impl From<MembershipEvent> for DomainEvent {
    fn from(value: MembershipEvent) -> Self {
        DomainEvent::Membership(value)
    }
}
