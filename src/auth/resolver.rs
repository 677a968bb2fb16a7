//! Role resolution: the per-request pipeline from headers to a `Principal`.
//!
//! Flow Overview: extract the candidate credential, gate code-based paths
//! through the lockout guard, verify with the provider or student table,
//! determine the role, provision a backing account for first-contact
//! students, and register the session. Each stage is strictly sequential;
//! nothing here is retried.

use axum::http::{header::USER_AGENT, HeaderMap};
use tracing::warn;

use super::credentials::{resolve_credential, Credential};
use super::error::AuthError;
use super::state::AuthState;
use super::types::{Principal, Profile, Role};
use super::verifier;

/// A resolved principal plus the bookkeeping session registered for it.
#[derive(Clone, Debug)]
pub struct Authenticated {
    pub principal: Principal,
    pub session_id: String,
}

/// Resolve the request's identity, if it carries a credential.
///
/// `Ok(None)` means no credential was supplied; optional-auth routes treat
/// that as anonymous.
///
/// # Errors
/// See [`AuthError`] for the failure classes and their HTTP mapping.
pub async fn authenticate(
    state: &AuthState,
    headers: &HeaderMap,
) -> Result<Option<Authenticated>, AuthError> {
    let Some(credential) = resolve_credential(headers) else {
        return Ok(None);
    };

    let principal = match credential {
        Credential::BearerToken(token) | Credential::LegacySessionCookie(token) => {
            let raw = verifier::verify_bearer(state.provider(), &token).await?;
            resolve_account_principal(state, raw).await?
        }
        Credential::PassportCode(code) => resolve_passport_principal(state, headers, &code).await?,
    };

    let fingerprint = client_fingerprint(headers);
    let session_id = state.sessions().register(&principal.account_id, &fingerprint);

    Ok(Some(Authenticated {
        principal,
        session_id,
    }))
}

/// Resolve the request's identity, rejecting anonymous requests.
///
/// # Errors
/// `NoCredential` when the request carries nothing; otherwise as
/// [`authenticate`].
pub async fn require_auth(
    state: &AuthState,
    headers: &HeaderMap,
) -> Result<Authenticated, AuthError> {
    authenticate(state, headers)
        .await?
        .ok_or(AuthError::NoCredential)
}

/// Role determination for provider-verified accounts (bearer and legacy
/// cookie paths), in strict rule order.
async fn resolve_account_principal(
    state: &AuthState,
    raw: super::types::RawPrincipal,
) -> Result<Principal, AuthError> {
    // An explicit role claim resolves on its own; backing rows only enrich
    // the principal when they exist.
    if let Some(role) = raw.role_claim {
        return match role {
            Role::Teacher | Role::Admin => {
                match cached_profile(state, &raw.account_id).await? {
                    Some(profile) => Ok(Principal::teacher(role, profile)),
                    None => Ok(Principal::claimed(role, raw.account_id, raw.email)),
                }
            }
            Role::Student => {
                match state.store().fetch_student_by_account(&raw.account_id).await? {
                    Some(student) => {
                        let email = raw.email.unwrap_or_else(|| {
                            state.provisioner().synthesized_email(student.student_id)
                        });
                        Ok(Principal::student(raw.account_id, email, student))
                    }
                    None => Ok(Principal::claimed(role, raw.account_id, raw.email)),
                }
            }
        };
    }

    // No claim: a profile row is the legacy role signal.
    if let Some(profile) = cached_profile(state, &raw.account_id).await? {
        let role = legacy_role_from_profile(&profile);
        return Ok(Principal::teacher(role, profile));
    }

    // No claim, no profile: a linked student row still identifies a student.
    if let Some(student) = state.store().fetch_student_by_account(&raw.account_id).await? {
        let email = raw
            .email
            .unwrap_or_else(|| state.provisioner().synthesized_email(student.student_id));
        return Ok(Principal::student(raw.account_id, email, student));
    }

    warn!(
        account_id = %raw.account_id,
        "Account not configured correctly: no role claim, profile, or student row"
    );
    Err(AuthError::AccountMisconfigured)
}

/// Profile lookup through the process-wide cache. A miss fetches from the
/// backing store and populates the cache; absence is cached nowhere, so a
/// profile created later is visible on the next request.
async fn cached_profile(
    state: &AuthState,
    account_id: &super::types::AccountId,
) -> Result<Option<Profile>, AuthError> {
    if let Some(profile) = state.profile_cache().get(account_id) {
        return Ok(Some(profile));
    }
    let Some(profile) = state.store().fetch_profile(account_id).await? else {
        return Ok(None);
    };
    state.profile_cache().insert(profile.clone());
    Ok(Some(profile))
}

/// Backward-compatible fallback for accounts created before explicit role
/// claims existed: a profile row means teacher. Isolated here so it can be
/// deleted once a role-claim backfill has run; the warn makes remaining
/// reliance on it visible.
fn legacy_role_from_profile(profile: &Profile) -> Role {
    warn!(
        account_id = %profile.account_id,
        "Role resolved via legacy profile fallback"
    );
    Role::Teacher
}

/// Passport-code path: lockout gate, verification, failure accounting, JIT
/// provisioning.
async fn resolve_passport_principal(
    state: &AuthState,
    headers: &HeaderMap,
    code: &str,
) -> Result<Principal, AuthError> {
    // Failures count against both the attempted code and the client address;
    // a lock on either rejects the attempt.
    let mut subjects = vec![code.to_string()];
    if let Some(addr) = extract_client_ip(headers) {
        subjects.push(addr);
    }

    for subject in &subjects {
        if let Some(remaining) = state.lockout().active_lock(subject) {
            return Err(AuthError::Locked { remaining });
        }
    }

    match verifier::verify_passport_code(state.store(), code).await {
        Ok(student) => {
            for subject in &subjects {
                state.lockout().record_success(subject);
            }
            let account_id = state.provisioner().ensure_student_account(&student).await?;
            let email = state.provisioner().synthesized_email(student.student_id);
            let mut student = student;
            student.account_id = Some(account_id.clone());
            Ok(Principal::student(account_id, email, student))
        }
        Err(err)
            if matches!(
                err,
                AuthError::MalformedCredential | AuthError::InvalidCredential
            ) =>
        {
            // Malformed and unknown codes feed the same counter; format
            // failures are the only signal a code-guesser leaves.
            let mut lock_remaining = None;
            for subject in &subjects {
                let status = state.lockout().check_and_record_failure(subject);
                if status.locked {
                    lock_remaining = status.remaining;
                }
            }
            match lock_remaining {
                Some(remaining) => Err(AuthError::Locked { remaining }),
                None => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

/// Client IP from common proxy headers, for lockout subject keying.
fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Session ids are derived from this; it only needs to distinguish clients,
/// not authenticate them.
fn client_fingerprint(headers: &HeaderMap) -> String {
    let addr = extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    let agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");
    format!("{addr}|{agent}")
}
