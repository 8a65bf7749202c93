use serde::{Deserialize, Serialize};

use accord_core::DomainError;

/// Role a person holds within a group.
///
/// The derived ordering is load-bearing: administrative capability increases
/// monotonically with the role, and authorization checks compare roles with
/// `>=` rather than matching exact variants.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum MembershipRole {
    #[default]
    Unknown = 0,
    User = 1,
    Editor = 2,
    Sponsor = 3,
    Administrator = 4,
}

impl MembershipRole {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Lowercase label used in notification bodies.
    pub fn label(self) -> &'static str {
        match self {
            MembershipRole::Unknown => "unknown",
            MembershipRole::User => "user",
            MembershipRole::Editor => "editor",
            MembershipRole::Sponsor => "sponsor",
            MembershipRole::Administrator => "administrator",
        }
    }
}

impl core::fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<u8> for MembershipRole {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MembershipRole::Unknown),
            1 => Ok(MembershipRole::User),
            2 => Ok(MembershipRole::Editor),
            3 => Ok(MembershipRole::Sponsor),
            4 => Ok(MembershipRole::Administrator),
            other => Err(DomainError::validation(format!(
                "unknown membership role: {other}"
            ))),
        }
    }
}
