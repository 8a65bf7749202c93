//! Login processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accord_core::DomainResult;
use accord_directory::{AccountStatus, Person};

use crate::events::AccountEvent;
use crate::password::verify_password;

/// Outcome of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginStatus {
    Succeed,
    Failed,
    /// The account exists but has not been confirmed yet.
    PendingAccount,
    /// The account is locked or disabled; the password is not even checked.
    FailedLockedAccount,
}

/// Evaluate a login attempt.
///
/// Decision order: unknown person fails; a non-authenticatable status maps to
/// `PendingAccount` or `FailedLockedAccount` before any password work; only
/// then is the candidate checked against the stored hash.
///
/// Returns the outcome together with the audit events to publish. The only
/// error is `CorruptCredential` (unreadable stored hash).
pub fn process_login(
    username: &str,
    person: Option<&Person>,
    candidate: &str,
    now: DateTime<Utc>,
) -> DomainResult<(LoginStatus, Vec<AccountEvent>)> {
    let mut events = vec![AccountEvent::LoginRequested {
        username: username.to_string(),
        occurred_at: now,
    }];

    let failed = |mut events: Vec<AccountEvent>, status| {
        events.push(AccountEvent::LoginFailed {
            username: username.to_string(),
            occurred_at: now,
        });
        Ok((status, events))
    };

    let Some(person) = person else {
        return failed(events, LoginStatus::Failed);
    };

    if !person.status.can_authenticate() {
        let status = if person.status == AccountStatus::Pending {
            LoginStatus::PendingAccount
        } else {
            LoginStatus::FailedLockedAccount
        };
        return failed(events, status);
    }

    if verify_password(&person.password_hash, candidate)? {
        events.push(AccountEvent::LoginSucceeded {
            person_id: person.id,
            occurred_at: now,
        });
        Ok((LoginStatus::Succeed, events))
    } else {
        failed(events, LoginStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::hash_password;
    use accord_core::PersonId;

    fn person_with(status: AccountStatus, password: &str) -> Person {
        let mut p = Person::new(
            PersonId::new(),
            "mara",
            "Mara Lane",
            "mara@example.org",
            hash_password(password).unwrap(),
            Utc::now(),
        );
        p.status = status;
        p
    }

    #[test]
    fn active_person_with_correct_password_succeeds() {
        let p = person_with(AccountStatus::Active, "pw1");
        let (status, events) = process_login("mara", Some(&p), "pw1", Utc::now()).unwrap();

        assert_eq!(status, LoginStatus::Succeed);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AccountEvent::LoginRequested { .. }));
        assert!(matches!(events[1], AccountEvent::LoginSucceeded { .. }));
    }

    #[test]
    fn wrong_password_fails() {
        let p = person_with(AccountStatus::Active, "pw1");
        let (status, events) = process_login("mara", Some(&p), "nope", Utc::now()).unwrap();

        assert_eq!(status, LoginStatus::Failed);
        assert!(matches!(events[1], AccountEvent::LoginFailed { .. }));
    }

    #[test]
    fn unknown_person_fails() {
        let (status, events) = process_login("ghost", None, "pw1", Utc::now()).unwrap();
        assert_eq!(status, LoginStatus::Failed);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn pending_account_reported_even_with_correct_password() {
        let p = person_with(AccountStatus::Pending, "pw1");
        let (status, _) = process_login("mara", Some(&p), "pw1", Utc::now()).unwrap();
        assert_eq!(status, LoginStatus::PendingAccount);
    }

    #[test]
    fn locked_account_fails_regardless_of_password() {
        for status in [
            AccountStatus::Locked,
            AccountStatus::LockedByAdmin,
            AccountStatus::Disabled,
        ] {
            let p = person_with(status, "pw1");
            let (outcome, _) = process_login("mara", Some(&p), "pw1", Utc::now()).unwrap();
            assert_eq!(outcome, LoginStatus::FailedLockedAccount);
        }
    }

    #[test]
    fn vacationing_account_may_still_log_in() {
        let p = person_with(AccountStatus::OnVacation, "pw1");
        let (status, _) = process_login("mara", Some(&p), "pw1", Utc::now()).unwrap();
        assert_eq!(status, LoginStatus::Succeed);
    }

    #[test]
    fn corrupt_stored_hash_is_an_error_not_an_outcome() {
        let mut p = person_with(AccountStatus::Active, "pw1");
        p.password_hash = "garbage".into();
        assert!(process_login("mara", Some(&p), "pw1", Utc::now()).is_err());
    }
}
