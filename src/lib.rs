//! # Rollcall
//!
//! `rollcall` is the identity-resolution and session-governance backend for a
//! classroom-management platform. Teachers sign in with accounts held by an
//! external identity provider; students join with short passport codes
//! printed on cards (`FOX-7K2`); older clients still present an opaque
//! `student_session` cookie.
//!
//! ## Resolution pipeline
//!
//! Every authenticated request flows through [`auth::resolver`]: credential
//! extraction (bearer, passport code, legacy cookie, in that precedence),
//! verification against the provider or the student table, role
//! determination, and session registration. Passport-code attempts pass
//! through a sliding-window lockout keyed by both the attempted code and the
//! client address.
//!
//! ## Just-in-time provisioning
//!
//! Students exist as classroom rows long before the identity provider has
//! heard of them. The first successful passport-code use creates a provider
//! account with a synthesized email derived from the student's stable id,
//! waits out the provider's replication delay, and links the account locally.
//! The synthesized email makes the whole sequence idempotent.
//!
//! ## State
//!
//! Lockout records, the profile cache, and session bookkeeping are held
//! in-process. A horizontally scaled deployment enforces these limits per
//! process, not globally.

pub mod api;
pub mod auth;
pub mod cli;
