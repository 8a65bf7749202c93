//! Event subscriber that turns domain events into outgoing messages.
//!
//! Dispatch is fire-and-forget: a failed lookup or send is logged and the
//! event dropped. The bus is at-least-once, so the handler stays idempotent
//! by construction (rendering and sending have no local state).

use accord_auth::{AccountEvent, DomainEvent};
use accord_core::{GroupId, PersonId};
use accord_directory::{DirectoryProvider, Group, GroupEvent, GroupKey, Person, PersonKey};
use accord_events::{Event, EventHandler, Subscription};
use accord_membership::MembershipEvent;

use crate::mailer::{EmailMessage, Mailer};
use crate::messages::MessageCatalog;

/// Formats and sends messages for the events one bus subscription carries.
pub struct NotificationDispatcher<'a, P, M> {
    provider: &'a P,
    catalog: MessageCatalog,
    mailer: &'a M,
}

impl<'a, P, M> NotificationDispatcher<'a, P, M>
where
    P: DirectoryProvider,
    M: Mailer,
{
    pub fn new(provider: &'a P, catalog: MessageCatalog, mailer: &'a M) -> Self {
        Self {
            provider,
            catalog,
            mailer,
        }
    }

    /// Drain everything currently queued on the subscription.
    ///
    /// Returns the number of events handled. Callers own the loop cadence
    /// (worker thread, test assertion, shutdown drain).
    pub fn run_pending(&self, subscription: &Subscription<DomainEvent>) -> usize {
        let mut handled = 0;
        while let Ok(event) = subscription.try_recv() {
            self.on_event(&event);
            handled += 1;
        }
        handled
    }

    fn person(&self, id: PersonId) -> Option<Person> {
        let person = self.provider.person_by(&PersonKey::Id(id));
        if person.is_none() {
            tracing::warn!(%id, "dropping notification: unknown person");
        }
        person
    }

    fn group(&self, id: GroupId) -> Option<Group> {
        let group = self.provider.group_by(&GroupKey::Id(id));
        if group.is_none() {
            tracing::warn!(%id, "dropping notification: unknown group");
        }
        group
    }

    fn member_context(&self, person_id: PersonId, group_id: GroupId) -> Option<(Person, Group)> {
        Some((self.person(person_id)?, self.group(group_id)?))
    }

    fn deliver(&self, recipient: &str, message: EmailMessage) {
        if let Err(err) = self.mailer.send(recipient, &message) {
            tracing::warn!(error = ?err, %recipient, "failed to send notification");
        }
    }

    fn on_account(&self, event: &AccountEvent) {
        match event {
            AccountEvent::Registered { person_id, .. } => {
                if let Some(person) = self.person(*person_id) {
                    self.deliver(&person.email, self.catalog.registration(&person));
                }
            }
            AccountEvent::PasswordResetRequested { person_id, .. } => {
                if let Some(person) = self.person(*person_id) {
                    self.deliver(&person.email, self.catalog.password_reset(&person));
                }
            }
            // Login events feed the account activity log, not the mailer.
            AccountEvent::LoginRequested { .. }
            | AccountEvent::LoginSucceeded { .. }
            | AccountEvent::LoginFailed { .. } => {
                tracing::debug!(event = event.event_type(), "account activity recorded");
            }
        }
    }

    fn on_membership(&self, event: &MembershipEvent) {
        match event {
            MembershipEvent::Requested(e) => {
                if let Some((person, group)) = self.member_context(e.person_id, e.group_id) {
                    self.deliver(
                        &person.email,
                        self.catalog.membership_application(&person, &group),
                    );
                }
            }
            MembershipEvent::Approved(e) => {
                if let Some((person, group)) = self.member_context(e.person_id, e.group_id) {
                    self.deliver(
                        &person.email,
                        self.catalog.membership_welcome(&person, &group),
                    );
                }
            }
            MembershipEvent::Revoked(e) => {
                if let Some((person, group)) = self.member_context(e.person_id, e.group_id) {
                    self.deliver(
                        &person.email,
                        self.catalog.membership_revoked(
                            &person,
                            &group,
                            e.self_removal,
                            e.reason.as_deref(),
                        ),
                    );
                }
            }
            MembershipEvent::RoleUpgraded(e) => {
                if let Some((person, group)) = self.member_context(e.person_id, e.group_id) {
                    self.deliver(
                        &person.email,
                        self.catalog.role_upgraded(&person, &group, e.role),
                    );
                }
            }
            MembershipEvent::RoleDowngraded(e) => {
                if let Some((person, group)) = self.member_context(e.person_id, e.group_id) {
                    self.deliver(
                        &person.email,
                        self.catalog.role_downgraded(&person, &group, e.role),
                    );
                }
            }
            MembershipEvent::AdminChanged(e) => {
                if let Some((person, group)) = self.member_context(e.new_admin, e.group_id) {
                    let former = e
                        .previous_admin
                        .and_then(|id| self.provider.person_by(&PersonKey::Id(id)))
                        .map(|p| p.fullname)
                        .unwrap_or_else(|| "An account administrator".to_string());
                    self.deliver(
                        &person.email,
                        self.catalog.admin_changed(&person, &group, &former),
                    );
                }
            }
        }
    }

    fn on_group(&self, event: &GroupEvent) {
        match event {
            GroupEvent::Created(e) => {
                tracing::debug!(group_id = %e.group_id, "group created");
            }
            GroupEvent::Edited(e) => {
                let Some(group) = self.group(e.group_id) else {
                    return;
                };

                // A mailing list wins as recipient; without one the owner is
                // told, except about their own edits.
                if let Some(list) = group.mailing_list.clone() {
                    self.deliver(&list, self.catalog.group_updated(&group, "folks", &e.changes));
                } else if e.editor == group.owner_id {
                    tracing::debug!(group = %group.name, "owner edited own group, no recipients");
                } else if let Some(owner) = self.person(group.owner_id) {
                    self.deliver(
                        &owner.email,
                        self.catalog
                            .group_updated(&group, &owner.fullname, &e.changes),
                    );
                }
            }
        }
    }
}

impl<'a, P, M> EventHandler<DomainEvent> for NotificationDispatcher<'a, P, M>
where
    P: DirectoryProvider,
    M: Mailer,
{
    fn on_event(&self, event: &DomainEvent) {
        match event {
            DomainEvent::Account(e) => self.on_account(e),
            DomainEvent::Membership(e) => self.on_membership(e),
            DomainEvent::Group(e) => self.on_group(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::RecordingMailer;
    use accord_core::MembershipId;
    use accord_directory::{DirectoryRegister, FieldChange, GroupEdited, InMemoryDirectory};
    use accord_events::{EventBus, InMemoryEventBus};
    use accord_membership::{MembershipApproved, MembershipRevoked};
    use chrono::Utc;

    struct Fixture {
        dir: InMemoryDirectory,
        mailer: RecordingMailer,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: InMemoryDirectory::new(),
                mailer: RecordingMailer::new(),
            }
        }

        fn dispatcher(&self) -> NotificationDispatcher<'_, InMemoryDirectory, RecordingMailer> {
            NotificationDispatcher::new(
                &self.dir,
                MessageCatalog::new("Example Collective", "admin@example.org", "https://acct"),
                &self.mailer,
            )
        }

        fn person(&self, username: &str) -> Person {
            let person = Person::new(
                PersonId::new(),
                username,
                format!("{username} Fullname"),
                format!("{username}@example.org"),
                "$argon2id$stub",
                Utc::now(),
            );
            self.dir.save_person(&person).unwrap();
            person
        }

        fn group(&self, name: &str, owner: &Person) -> Group {
            let group = Group::new(GroupId::new(), name, owner.id, Utc::now());
            self.dir.save_group(&group).unwrap();
            group
        }
    }

    #[test]
    fn approval_event_sends_the_welcome_message() {
        let fx = Fixture::new();
        let owner = fx.person("owner");
        let member = fx.person("ada");
        let group = fx.group("docs", &owner);

        let bus: InMemoryEventBus<DomainEvent> = InMemoryEventBus::new();
        let sub = bus.subscribe();
        bus.publish(DomainEvent::Membership(MembershipEvent::Approved(
            MembershipApproved {
                membership_id: MembershipId::new(),
                person_id: member.id,
                group_id: group.id,
                sponsor: Some(owner.id),
                occurred_at: Utc::now(),
            },
        )))
        .unwrap();

        let handled = fx.dispatcher().run_pending(&sub);
        assert_eq!(handled, 1);

        let sent = fx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "ada@example.org");
        assert!(sent[0].1.subject.contains("Welcome to group docs"));
    }

    #[test]
    fn revocation_template_tracks_the_cause() {
        let fx = Fixture::new();
        let owner = fx.person("owner");
        let member = fx.person("ada");
        let group = fx.group("docs", &owner);

        let dispatcher = fx.dispatcher();
        let revoked = |self_removal, reason: Option<&str>| {
            DomainEvent::Membership(MembershipEvent::Revoked(MembershipRevoked {
                membership_id: MembershipId::new(),
                person_id: member.id,
                group_id: group.id,
                self_removal,
                reason: reason.map(str::to_string),
                occurred_at: Utc::now(),
            }))
        };

        dispatcher.on_event(&revoked(true, None));
        dispatcher.on_event(&revoked(false, Some("inactivity")));

        let sent = fx.mailer.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].1.body.contains("as requested"));
        assert!(sent[1].1.body.contains("inactivity"));
    }

    #[test]
    fn group_edit_routing_prefers_the_mailing_list() {
        let fx = Fixture::new();
        let owner = fx.person("owner");
        let editor = fx.person("ed");
        let mut group = fx.group("docs", &owner);
        group.mailing_list = Some("docs@lists.example.org".to_string());
        fx.dir.save_group(&group).unwrap();

        let edited = DomainEvent::Group(GroupEvent::Edited(GroupEdited {
            group_id: group.id,
            editor: editor.id,
            changes: vec![FieldChange {
                field: "display name".into(),
                value: "Documentation".into(),
            }],
            occurred_at: Utc::now(),
        }));
        fx.dispatcher().on_event(&edited);

        let sent = fx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "docs@lists.example.org");
    }

    #[test]
    fn owner_editing_own_listless_group_notifies_nobody() {
        let fx = Fixture::new();
        let owner = fx.person("owner");
        let group = fx.group("docs", &owner);

        fx.dispatcher()
            .on_event(&DomainEvent::Group(GroupEvent::Edited(GroupEdited {
                group_id: group.id,
                editor: owner.id,
                changes: vec![],
                occurred_at: Utc::now(),
            })));

        assert!(fx.mailer.sent().is_empty());
    }

    #[test]
    fn someone_elses_edit_reaches_the_owner() {
        let fx = Fixture::new();
        let owner = fx.person("owner");
        let editor = fx.person("ed");
        let group = fx.group("docs", &owner);

        fx.dispatcher()
            .on_event(&DomainEvent::Group(GroupEvent::Edited(GroupEdited {
                group_id: group.id,
                editor: editor.id,
                changes: vec![],
                occurred_at: Utc::now(),
            })));

        let sent = fx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "owner@example.org");
    }

    #[test]
    fn unknown_person_drops_the_message_without_panicking() {
        let fx = Fixture::new();
        let owner = fx.person("owner");
        let group = fx.group("docs", &owner);

        fx.dispatcher()
            .on_event(&DomainEvent::Membership(MembershipEvent::Approved(
                MembershipApproved {
                    membership_id: MembershipId::new(),
                    person_id: PersonId::new(),
                    group_id: group.id,
                    sponsor: None,
                    occurred_at: Utc::now(),
                },
            )));

        assert!(fx.mailer.sent().is_empty());
    }

    #[test]
    fn login_events_do_not_send_mail() {
        let fx = Fixture::new();
        let person = fx.person("ada");

        let dispatcher = fx.dispatcher();
        dispatcher.on_event(&DomainEvent::Account(AccountEvent::LoginRequested {
            username: "ada".into(),
            occurred_at: Utc::now(),
        }));
        dispatcher.on_event(&DomainEvent::Account(AccountEvent::LoginSucceeded {
            person_id: person.id,
            occurred_at: Utc::now(),
        }));

        assert!(fx.mailer.sent().is_empty());
    }

    #[test]
    fn registration_event_mails_the_confirmation_link() {
        let fx = Fixture::new();
        let mut person = fx.person("ada");
        person.email_token = Some("tok-123".to_string());
        fx.dir.save_person(&person).unwrap();

        fx.dispatcher()
            .on_event(&DomainEvent::Account(AccountEvent::Registered {
                person_id: person.id,
                occurred_at: Utc::now(),
            }));

        let sent = fx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.body.contains("/confirm/tok-123"));
    }
}
