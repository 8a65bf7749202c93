use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accord_core::PersonId;

/// Account lifecycle status.
///
/// Only `Active`, `Inactive` and `OnVacation` accounts may authenticate;
/// everything else is either not yet confirmed or blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Registered, confirmation still outstanding.
    Pending,
    Active,
    Inactive,
    OnVacation,
    /// Locked automatically (e.g. too many failed attempts).
    Locked,
    LockedByAdmin,
    Disabled,
}

impl AccountStatus {
    pub fn can_authenticate(self) -> bool {
        matches!(
            self,
            AccountStatus::Active | AccountStatus::Inactive | AccountStatus::OnVacation
        )
    }

    /// Statuses that block login outright (as opposed to merely pending).
    pub fn is_blocked(self) -> bool {
        matches!(
            self,
            AccountStatus::Locked | AccountStatus::LockedByAdmin | AccountStatus::Disabled
        )
    }
}

/// A person's account record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub username: String,
    pub fullname: String,
    pub email: String,
    /// Argon2 PHC-format string; never the plain password.
    pub password_hash: String,
    pub status: AccountStatus,
    /// Outstanding account-confirmation token, cleared on confirmation.
    pub email_token: Option<String>,
    /// Outstanding password-reset token, cleared on reset.
    pub password_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Person {
    /// A freshly registered person: pending until the confirmation token is
    /// redeemed.
    pub fn new(
        id: PersonId,
        username: impl Into<String>,
        fullname: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            fullname: fullname.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            status: AccountStatus::Pending,
            email_token: None,
            password_token: None,
            created_at,
        }
    }
}
