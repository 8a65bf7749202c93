//! Message templates for account and membership notifications.

use std::env;

use accord_directory::{FieldChange, Group, Person};
use accord_membership::MembershipRole;

use crate::mailer::EmailMessage;

/// Renders the notification templates for one organisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCatalog {
    pub organisation: String,
    pub admin_email: String,
    /// Base URL account links are built from (no trailing slash).
    pub base_url: String,
}

impl MessageCatalog {
    pub fn new(
        organisation: impl Into<String>,
        admin_email: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            organisation: organisation.into(),
            admin_email: admin_email.into(),
            base_url: base_url.into(),
        }
    }

    /// Read the organisation settings from `ACCORD_*` environment variables,
    /// with defaults suitable for development.
    pub fn from_env() -> Self {
        Self {
            organisation: env::var("ACCORD_ORGANISATION")
                .unwrap_or_else(|_| "Accord Project".to_string()),
            admin_email: env::var("ACCORD_ADMIN_EMAIL")
                .unwrap_or_else(|_| "accounts@localhost".to_string()),
            base_url: env::var("ACCORD_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:6543".to_string()),
        }
    }

    fn signature(&self) -> String {
        format!("Regards,\n-\nThe {}", self.organisation)
    }

    fn group_name(group: &Group) -> &str {
        group.display_name.as_deref().unwrap_or(&group.name)
    }

    pub fn registration(&self, person: &Person) -> EmailMessage {
        let token = person.email_token.as_deref().unwrap_or_default();
        EmailMessage {
            subject: format!("Confirm your {} account!", self.organisation),
            body: format!(
                "Welcome to the {orga}!\n\n\
                 To complete your account creation, please visit this link:\n\
                 {base}/confirm/{token}\n\n\
                 {sig}\n",
                orga = self.organisation,
                base = self.base_url,
                token = token,
                sig = self.signature(),
            ),
        }
    }

    pub fn password_reset(&self, person: &Person) -> EmailMessage {
        let token = person.password_token.as_deref().unwrap_or_default();
        EmailMessage {
            subject: "Password reset request on your account".to_string(),
            body: format!(
                "Hello {fullname},\n\n\
                 Someone (hopefully you) has requested a password reset for your\n\
                 account `{username}` on the {orga} account system.\n\n\
                 To complete this procedure, please visit this link:\n\
                 {base}/reset/{token}\n\n\
                 If you did not request this change, simply disregard this email\n\
                 and contact an administrator at: {admin}.\n\n\
                 {sig}\n",
                fullname = person.fullname,
                username = person.username,
                orga = self.organisation,
                base = self.base_url,
                token = token,
                admin = self.admin_email,
                sig = self.signature(),
            ),
        }
    }

    pub fn membership_application(&self, person: &Person, group: &Group) -> EmailMessage {
        EmailMessage {
            subject: format!(
                "Your membership request for {} is being reviewed",
                Self::group_name(group)
            ),
            body: format!(
                "Hello {fullname},\n\n\
                 Your request to be part of group {group} has been registered and\n\
                 will be reviewed as soon as possible by a sponsor or an\n\
                 administrator.\n\n\
                 {sig}\n",
                fullname = person.fullname,
                group = Self::group_name(group),
                sig = self.signature(),
            ),
        }
    }

    pub fn membership_welcome(&self, person: &Person, group: &Group) -> EmailMessage {
        EmailMessage {
            subject: format!("Welcome to group {}!", Self::group_name(group)),
            body: format!(
                "Hello {fullname},\n\n\
                 Thank you for joining group {group}.\n\n\
                 {sig}\n",
                fullname = person.fullname,
                group = Self::group_name(group),
                sig = self.signature(),
            ),
        }
    }

    pub fn role_upgraded(
        &self,
        person: &Person,
        group: &Group,
        role: MembershipRole,
    ) -> EmailMessage {
        EmailMessage {
            subject: format!(
                "You have been promoted to {} in group {}",
                role.label(),
                Self::group_name(group)
            ),
            body: format!(
                "Congratulations {fullname},\n\n\
                 You have been upgraded to {role} in group {group}.\n\n\
                 {sig}\n",
                fullname = person.fullname,
                role = role.label(),
                group = Self::group_name(group),
                sig = self.signature(),
            ),
        }
    }

    pub fn role_downgraded(
        &self,
        person: &Person,
        group: &Group,
        role: MembershipRole,
    ) -> EmailMessage {
        EmailMessage {
            subject: format!(
                "You have been demoted to {} in group {}",
                role.label(),
                Self::group_name(group)
            ),
            body: format!(
                "Hello {fullname},\n\n\
                 This is to inform you that you have been downgraded to {role}\n\
                 in group {group}.\n\n\
                 {sig}\n",
                fullname = person.fullname,
                role = role.label(),
                group = Self::group_name(group),
                sig = self.signature(),
            ),
        }
    }

    pub fn admin_changed(&self, person: &Person, group: &Group, former: &str) -> EmailMessage {
        EmailMessage {
            subject: format!(
                "You have been promoted to principal administrator of {}",
                Self::group_name(group)
            ),
            body: format!(
                "Hello {fullname},\n\n\
                 {former} has made you the new principal administrator of group\n\
                 {group}.\n\n\
                 {sig}\n",
                fullname = person.fullname,
                former = former,
                group = Self::group_name(group),
                sig = self.signature(),
            ),
        }
    }

    /// Removal notice; voluntary and administrative removals read differently.
    pub fn membership_revoked(
        &self,
        person: &Person,
        group: &Group,
        self_removal: bool,
        reason: Option<&str>,
    ) -> EmailMessage {
        let subject = format!(
            "You have been removed from group {}",
            Self::group_name(group)
        );

        let body = if self_removal {
            format!(
                "Hello {fullname},\n\n\
                 This is to inform you that you have been removed from the\n\
                 {group} group, as requested.\n\n\
                 {sig}\n",
                fullname = person.fullname,
                group = Self::group_name(group),
                sig = self.signature(),
            )
        } else {
            format!(
                "Hello {fullname},\n\n\
                 This is to inform you that you have been removed from the group\n\
                 {group} with the following reason:\n\n\
                 {reason}\n\n\
                 If you believe this action was not expected, please contact a\n\
                 group administrator or an account administrator at {admin}.\n\n\
                 {sig}\n",
                fullname = person.fullname,
                group = Self::group_name(group),
                reason = reason.unwrap_or("(no reason given)"),
                admin = self.admin_email,
                sig = self.signature(),
            )
        };

        EmailMessage { subject, body }
    }

    pub fn group_updated(
        &self,
        group: &Group,
        recipients_name: &str,
        changes: &[FieldChange],
    ) -> EmailMessage {
        let mut rendered = String::new();
        for change in changes {
            rendered.push_str(&format!("    {}:    {}\n", change.field, change.value));
        }

        EmailMessage {
            subject: format!("Group {} has been updated", Self::group_name(group)),
            body: format!(
                "Hello {recipients},\n\n\
                 The information of group {group} changed:\n\n\
                 {changes}\n\
                 Questions go to {admin}.\n\n\
                 {sig}\n",
                recipients = recipients_name,
                group = Self::group_name(group),
                changes = rendered,
                admin = self.admin_email,
                sig = self.signature(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_core::{GroupId, PersonId};
    use chrono::Utc;

    fn catalog() -> MessageCatalog {
        MessageCatalog::new("Example Collective", "admin@example.org", "https://acct.example.org")
    }

    fn person() -> Person {
        let mut p = Person::new(
            PersonId::new(),
            "ada",
            "Ada Lovelace",
            "ada@example.org",
            "$argon2id$stub",
            Utc::now(),
        );
        p.email_token = Some("tok-confirm".to_string());
        p.password_token = Some("tok-reset".to_string());
        p
    }

    fn group() -> Group {
        Group::new(GroupId::new(), "docs", PersonId::new(), Utc::now())
    }

    #[test]
    fn registration_links_the_confirmation_token() {
        let msg = catalog().registration(&person());
        assert!(msg.subject.contains("Example Collective"));
        assert!(msg.body.contains("https://acct.example.org/confirm/tok-confirm"));
    }

    #[test]
    fn revocation_bodies_differ_by_cause() {
        let c = catalog();
        let voluntary = c.membership_revoked(&person(), &group(), true, None);
        let administrative =
            c.membership_revoked(&person(), &group(), false, Some("inactivity"));

        assert_eq!(voluntary.subject, administrative.subject);
        assert!(voluntary.body.contains("as requested"));
        assert!(administrative.body.contains("inactivity"));
        assert!(!voluntary.body.contains("reason"));
    }

    #[test]
    fn group_update_lists_changed_fields() {
        let changes = vec![
            FieldChange {
                field: "display name".into(),
                value: "Documentation".into(),
            },
            FieldChange {
                field: "mailing list".into(),
                value: "docs@lists.example.org".into(),
            },
        ];
        let msg = catalog().group_updated(&group(), "folks", &changes);
        assert!(msg.body.contains("display name:    Documentation"));
        assert!(msg.body.contains("mailing list:    docs@lists.example.org"));
    }

    #[test]
    fn display_name_preferred_over_short_name() {
        let mut g = group();
        g.display_name = Some("Documentation Team".into());
        let msg = catalog().membership_welcome(&person(), &g);
        assert!(msg.subject.contains("Documentation Team"));
    }
}
