//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, authorization). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input or disallowed parameter).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (e.g. an illegal state transition).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (unknown person, group or token).
    #[error("not found")]
    NotFound,

    /// Authentication failed (bad credentials or unknown API key).
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated but insufficient role or permission for the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A live membership for this (person, group) already exists.
    #[error("already a member")]
    AlreadyMember,

    /// The group is invitation-only and no invite is held.
    #[error("group is invite-only")]
    InviteOnly,

    /// A stored credential is in an unreadable format. Fatal; the detail is
    /// never shown to users.
    #[error("stored credential is corrupt")]
    CorruptCredential,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// HTTP-like status code for the web layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvariantViolation(_) | Self::InvalidId(_) => 400,
            Self::AlreadyMember => 400,
            Self::Unauthorized => 401,
            Self::Forbidden(_) | Self::InviteOnly => 403,
            Self::NotFound => 404,
            Self::Conflict(_) => 409,
            Self::CorruptCredential => 500,
        }
    }

    /// User-facing `(name, text)` message pair.
    ///
    /// Internal failures collapse to a generic message; implementation detail
    /// stays in logs.
    pub fn user_message(&self) -> UserMessage {
        match self {
            Self::Validation(text) | Self::InvalidId(text) => {
                UserMessage::new("Parameter error.", text.clone())
            }
            Self::InvariantViolation(text) => UserMessage::new("Invalid request.", text.clone()),
            Self::NotFound => UserMessage::new("Item not found.", "No such item."),
            Self::Unauthorized => UserMessage::new("Access denied.", "Unauthorized API key."),
            Self::Forbidden(text) => UserMessage::new("Access denied.", text.clone()),
            Self::AlreadyMember => {
                UserMessage::new("Membership error.", "Already a member of this group.")
            }
            Self::InviteOnly => {
                UserMessage::new("Membership error.", "This group is invitation-only.")
            }
            Self::CorruptCredential | Self::Conflict(_) => {
                UserMessage::new("Internal error.", "Something went wrong, please retry.")
            }
        }
    }
}

/// Human-readable `(name, text)` pair shown to users on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub name: String,
    pub text: String,
}

impl UserMessage {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}
