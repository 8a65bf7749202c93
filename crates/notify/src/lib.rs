//! `accord-notify` — notification dispatch.
//!
//! Domain events come in on a bus subscription; this crate resolves the
//! recipients, renders the templated message and hands it to a `Mailer`.
//! Actual delivery transport (SMTP, queues) is out of scope and lives behind
//! the trait.

pub mod dispatch;
pub mod mailer;
pub mod messages;

pub use dispatch::NotificationDispatcher;
pub use mailer::{EmailMessage, Mailer, RecordingMailer};
pub use messages::MessageCatalog;
