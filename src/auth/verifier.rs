//! Credential verification against the identity provider and backing store.

use super::error::AuthError;
use super::passport;
use super::provider::{IdentityProvider, ProviderError};
use super::store::BackingStore;
use super::types::{RawPrincipal, StudentRef};

/// Verify a bearer (or legacy session) token with the identity provider.
///
/// Transport failure and rejection map to different error classes: the
/// former is retryable by the caller (503), the latter is terminal (403).
pub async fn verify_bearer(
    provider: &dyn IdentityProvider,
    token: &str,
) -> Result<RawPrincipal, AuthError> {
    provider.verify_token(token).await.map_err(|err| match err {
        ProviderError::Transport(_) | ProviderError::Protocol(_) => AuthError::ProviderUnavailable,
        ProviderError::Rejected => AuthError::InvalidCredential,
    })
}

/// Verify a passport code against the student table.
///
/// The lexical format is checked before any store call; a malformed code is
/// still a failed attempt for lockout purposes (the caller records it — the
/// format check is the brute-force defense's only code-guessing signal).
pub async fn verify_passport_code(
    store: &dyn BackingStore,
    code: &str,
) -> Result<StudentRef, AuthError> {
    if !passport::is_valid_format(code) {
        return Err(AuthError::MalformedCredential);
    }
    store
        .fetch_student_by_passport_code(code)
        .await?
        .ok_or(AuthError::InvalidCredential)
}
