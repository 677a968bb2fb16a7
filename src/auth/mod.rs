//! Identity resolution and session governance.
//!
//! Requests arrive with one of three credentials: a provider bearer token, an
//! `x-passport-code` header, or the legacy `student_session` cookie. This
//! module turns that credential into a [`Principal`] or a classified
//! [`AuthError`], enforcing brute-force lockout on code-based paths and
//! provisioning backing accounts for first-contact students along the way.

pub mod credentials;
pub mod error;
pub mod kv;
pub mod lockout;
pub mod passport;
pub mod profile_cache;
pub mod provider;
pub mod provision;
pub mod resolver;
pub mod sessions;
pub mod state;
pub mod store;
pub mod types;
pub mod verifier;

#[doc(hidden)]
pub mod testing;

pub use error::AuthError;
pub use resolver::{authenticate, require_auth, Authenticated};
pub use state::{AuthConfig, AuthState};
pub use types::{AccountId, Principal, Profile, Role, StudentRef};
