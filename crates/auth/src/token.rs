//! API token generation and validation.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use accord_core::{DomainError, DomainResult, PersonId};
use accord_directory::{AccountPermissionLevel, DirectoryProvider};

/// Entropy (in bytes) fed into token generation by default.
pub const DEFAULT_TOKEN_ENTROPY: usize = 256;

/// Generate an unguessable token string.
///
/// `length` bytes are drawn from the operating-system CSPRNG and digested
/// with SHA-256; the hex form of the digest is the token. Never seed this
/// from a deterministic generator.
pub fn generate_token(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(Sha256::digest(&bytes))
}

/// Generate a token the provider does not already know.
///
/// Collisions are negligible by construction; the lookup-and-retry is a
/// backstop in front of the store's unique constraint.
pub fn unique_token<P>(provider: &P, length: usize) -> String
where
    P: DirectoryProvider + ?Sized,
{
    loop {
        let token = generate_token(length);
        if provider.account_permission_by_token(&token).is_none() {
            return token;
        }
    }
}

/// What a valid token entitles its bearer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub permissions: AccountPermissionLevel,
    pub person_id: PersonId,
    pub application: String,
}

/// Look up an API token.
///
/// A pure, idempotent lookup: the same token yields the same grant until it
/// is revoked. An unknown token is `Unauthorized` ("Access denied." /
/// "Unauthorized API key." to users).
pub fn validate_token<P>(provider: &P, token: &str) -> DomainResult<TokenGrant>
where
    P: DirectoryProvider + ?Sized,
{
    match provider.account_permission_by_token(token) {
        Some(grant) => Ok(TokenGrant {
            permissions: grant.permissions,
            person_id: grant.person_id,
            application: grant.application,
        }),
        None => Err(DomainError::Unauthorized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_directory::{AccountPermission, DirectoryRegister, InMemoryDirectory};
    use chrono::Utc;

    #[test]
    fn tokens_are_hex_digests_of_fixed_size() {
        let token = generate_token(DEFAULT_TOKEN_ENTROPY);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_do_not_repeat() {
        let a = generate_token(32);
        let b = generate_token(32);
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_token_is_unauthorized() {
        let dir = InMemoryDirectory::new();
        assert_eq!(
            validate_token(&dir, "deadbeef"),
            Err(DomainError::Unauthorized)
        );
    }

    #[test]
    fn validation_is_idempotent_until_revoked() {
        let dir = InMemoryDirectory::new();
        let owner = PersonId::new();
        let token = generate_token(DEFAULT_TOKEN_ENTROPY);
        dir.insert_account_permission(&AccountPermission {
            token: token.clone(),
            person_id: owner,
            application: "release-tooling".into(),
            permissions: AccountPermissionLevel::CanReadPeopleFullInfo,
            granted_on: Utc::now(),
        })
        .unwrap();

        let first = validate_token(&dir, &token).unwrap();
        let second = validate_token(&dir, &token).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.person_id, owner);
        assert_eq!(
            first.permissions,
            AccountPermissionLevel::CanReadPeopleFullInfo
        );

        dir.remove_account_permission(&token).unwrap();
        assert_eq!(validate_token(&dir, &token), Err(DomainError::Unauthorized));
    }
}
