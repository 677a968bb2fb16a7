//! Core identity types shared across the auth pipeline.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Stable account identifier issued by the external identity provider.
pub type AccountId = String;

/// Role attached to a resolved principal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
    Admin,
}

impl Role {
    /// Parse a provider role claim. Unknown claims are ignored rather than
    /// rejected so that new provider-side roles do not break resolution.
    #[must_use]
    pub fn from_claim(claim: &str) -> Option<Self> {
        match claim {
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Admin => "admin",
        }
    }
}

/// Raw output of credential verification, before role resolution.
#[derive(Clone, Debug)]
pub struct RawPrincipal {
    pub account_id: AccountId,
    /// Explicit role claim set by the provider at account-creation time.
    /// Absent on accounts created before role claims existed.
    pub role_claim: Option<Role>,
    pub email: Option<String>,
}

/// Student row referenced by a passport code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudentRef {
    pub student_id: Uuid,
    pub class_id: Uuid,
    pub display_name: String,
    pub passport_code: String,
    /// Backing provider account, if one has been provisioned already.
    pub account_id: Option<AccountId>,
}

/// Account profile row, fetched from the backing store and cached.
///
/// Profiles exist only for teacher/admin accounts today; their presence is
/// the legacy role signal for accounts without an explicit role claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub account_id: AccountId,
    pub email: String,
    pub display_name: String,
    pub is_admin: bool,
}

/// Backing identity behind a principal. The rows are optional: an explicit
/// provider role claim resolves on its own, so a claimed principal may carry
/// no profile or student row at all.
#[derive(Clone, Debug)]
pub enum PrincipalKind {
    Teacher(Option<Profile>),
    Student(Option<StudentRef>),
}

/// Resolved identity attached to a request. Constructed fresh per request,
/// never persisted, discarded at request end.
#[derive(Clone, Debug)]
pub struct Principal {
    pub account_id: AccountId,
    pub role: Role,
    pub email: String,
    pub is_admin: bool,
    kind: PrincipalKind,
}

impl Principal {
    #[must_use]
    pub fn teacher(role: Role, profile: Profile) -> Self {
        Self {
            account_id: profile.account_id.clone(),
            role,
            email: profile.email.clone(),
            is_admin: profile.is_admin || role == Role::Admin,
            kind: PrincipalKind::Teacher(Some(profile)),
        }
    }

    #[must_use]
    pub fn student(account_id: AccountId, email: String, student: StudentRef) -> Self {
        Self {
            account_id,
            role: Role::Student,
            email,
            is_admin: false,
            kind: PrincipalKind::Student(Some(student)),
        }
    }

    /// Principal backed by an explicit role claim alone, with no profile or
    /// student row (yet).
    #[must_use]
    pub fn claimed(role: Role, account_id: AccountId, email: Option<String>) -> Self {
        let kind = match role {
            Role::Student => PrincipalKind::Student(None),
            Role::Teacher | Role::Admin => PrincipalKind::Teacher(None),
        };
        Self {
            account_id,
            role,
            email: email.unwrap_or_default(),
            is_admin: role == Role::Admin,
            kind,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &PrincipalKind {
        &self.kind
    }

    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        match &self.kind {
            PrincipalKind::Teacher(profile) => profile.as_ref(),
            PrincipalKind::Student(_) => None,
        }
    }

    #[must_use]
    pub fn student_ref(&self) -> Option<&StudentRef> {
        match &self.kind {
            PrincipalKind::Teacher(_) => None,
            PrincipalKind::Student(student) => student.as_ref(),
        }
    }

    #[must_use]
    pub fn class_id(&self) -> Option<Uuid> {
        self.student_ref().map(|student| student.class_id)
    }
}
