use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accord_core::{DomainError, PersonId};

/// Disclosure tier granted to an API token.
///
/// Tiers are ordered: a holder of a higher tier implicitly satisfies checks
/// for every lower one. The numeric values are the wire form (plain integers
/// compared ordinally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AccountPermissionLevel {
    CanReadPublicInfo = 0x01,
    CanReadPeopleFullInfo = 0x02,
    CanReadAndEditPeopleInfo = 0x04,
    CanEditGroupInfo = 0x08,
}

impl AccountPermissionLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this tier covers a check requiring `required`.
    pub fn satisfies(self, required: AccountPermissionLevel) -> bool {
        self >= required
    }
}

impl TryFrom<u8> for AccountPermissionLevel {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::CanReadPublicInfo),
            0x02 => Ok(Self::CanReadPeopleFullInfo),
            0x04 => Ok(Self::CanReadAndEditPeopleInfo),
            0x08 => Ok(Self::CanEditGroupInfo),
            other => Err(DomainError::validation(format!(
                "unknown permission level: {other:#04x}"
            ))),
        }
    }
}

/// An issued API token and its grant.
///
/// Tokens never expire; they live until explicitly revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPermission {
    /// The token string itself: unique and unguessable (CSPRNG-derived).
    pub token: String,
    pub person_id: PersonId,
    /// Application the token was issued to.
    pub application: String,
    pub permissions: AccountPermissionLevel,
    pub granted_on: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_tiers_satisfy_lower_checks() {
        use AccountPermissionLevel::*;

        assert!(CanEditGroupInfo.satisfies(CanReadPublicInfo));
        assert!(CanReadAndEditPeopleInfo.satisfies(CanReadPeopleFullInfo));
        assert!(CanReadPublicInfo.satisfies(CanReadPublicInfo));

        assert!(!CanReadPublicInfo.satisfies(CanReadPeopleFullInfo));
        assert!(!CanReadAndEditPeopleInfo.satisfies(CanEditGroupInfo));
    }

    #[test]
    fn wire_values_are_ordinal() {
        let low = AccountPermissionLevel::try_from(0x01).unwrap();
        let high = AccountPermissionLevel::try_from(0x08).unwrap();
        assert!(high.as_u8() > low.as_u8());
        assert!(AccountPermissionLevel::try_from(0x03).is_err());
    }
}
