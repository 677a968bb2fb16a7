//! In-memory provider and store doubles for unit and integration tests.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::passport::{self, Animal};
use super::provider::{IdentityProvider, ProviderError};
use super::store::BackingStore;
use super::types::{AccountId, Profile, RawPrincipal, StudentRef};

/// Identity provider double with configurable replication delay and outage.
#[derive(Default)]
pub struct FakeProvider {
    tokens: Mutex<HashMap<String, RawPrincipal>>,
    accounts: Mutex<HashMap<String, (AccountId, Instant)>>,
    replication_delay: Mutex<Duration>,
    unavailable: Mutex<bool>,
    pub created_accounts: AtomicU32,
}

impl FakeProvider {
    pub fn add_token(&self, token: &str, raw: RawPrincipal) {
        self.tokens.lock().unwrap().insert(token.to_string(), raw);
    }

    /// Pre-register an account as already replicated.
    pub fn add_account(&self, email: &str, account_id: &str) {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            (account_id.to_string(), Instant::now() - Duration::from_secs(1)),
        );
    }

    /// Newly created accounts stay invisible to lookups for this long.
    pub fn set_replication_delay(&self, delay: Duration) {
        *self.replication_delay.lock().unwrap() = delay;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    fn check_available(&self) -> Result<(), ProviderError> {
        if *self.unavailable.lock().unwrap() {
            Err(ProviderError::Transport("provider offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn verify_token(&self, token: &str) -> Result<RawPrincipal, ProviderError> {
        self.check_available()?;
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or(ProviderError::Rejected)
    }

    async fn create_account(
        &self,
        email: &str,
        _metadata: Value,
    ) -> Result<AccountId, ProviderError> {
        self.check_available()?;
        self.created_accounts.fetch_add(1, Ordering::SeqCst);
        let account_id = format!("acc-{}", Uuid::new_v4());
        let visible_at = Instant::now() + *self.replication_delay.lock().unwrap();
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (account_id.clone(), visible_at));
        Ok(account_id)
    }

    async fn lookup_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountId>, ProviderError> {
        self.check_available()?;
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts.get(email).and_then(|(account_id, visible_at)| {
            if *visible_at <= Instant::now() {
                Some(account_id.clone())
            } else {
                None
            }
        }))
    }
}

/// Backing-store double. `forced_collisions` makes the next N passport-code
/// inserts collide, for exercising the bounded-retry path.
#[derive(Default)]
pub struct FakeStore {
    profiles: Mutex<HashMap<AccountId, Profile>>,
    students: Mutex<HashMap<String, StudentRef>>,
    pub forced_collisions: AtomicU32,
    pub backing_record_calls: AtomicU32,
    pub passport_lookups: AtomicU32,
}

impl FakeStore {
    pub fn add_profile(&self, profile: Profile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.account_id.clone(), profile);
    }

    pub fn add_student(&self, student: StudentRef) {
        self.students
            .lock()
            .unwrap()
            .insert(student.passport_code.clone(), student);
    }
}

#[async_trait]
impl BackingStore for FakeStore {
    async fn fetch_profile(&self, account_id: &AccountId) -> Result<Option<Profile>> {
        Ok(self.profiles.lock().unwrap().get(account_id).cloned())
    }

    async fn fetch_student_by_passport_code(&self, code: &str) -> Result<Option<StudentRef>> {
        self.passport_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.students.lock().unwrap().get(code).cloned())
    }

    async fn fetch_student_by_account(&self, account_id: &AccountId) -> Result<Option<StudentRef>> {
        Ok(self
            .students
            .lock()
            .unwrap()
            .values()
            .find(|student| student.account_id.as_ref() == Some(account_id))
            .cloned())
    }

    async fn create_student(
        &self,
        class_id: Uuid,
        display_name: &str,
        animal: Animal,
    ) -> Result<StudentRef> {
        for _ in 0..passport::MAX_GENERATION_ATTEMPTS {
            let code = passport::generate_code(animal);
            let mut students = self.students.lock().unwrap();
            let collide = self
                .forced_collisions
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                    count.checked_sub(1)
                })
                .is_ok();
            if collide || students.contains_key(&code) {
                continue;
            }
            let student = StudentRef {
                student_id: Uuid::new_v4(),
                class_id,
                display_name: display_name.to_string(),
                passport_code: code.clone(),
                account_id: None,
            };
            students.insert(code, student.clone());
            return Ok(student);
        }
        Err(anyhow!(
            "failed to generate a unique passport code after {} attempts",
            passport::MAX_GENERATION_ATTEMPTS
        ))
    }

    async fn create_student_backing_records(
        &self,
        student_id: Uuid,
        account_id: &AccountId,
        email: &str,
        display_name: &str,
    ) -> Result<()> {
        self.backing_record_calls.fetch_add(1, Ordering::SeqCst);
        let mut students = self.students.lock().unwrap();
        for student in students.values_mut() {
            if student.student_id == student_id {
                student.account_id = Some(account_id.clone());
            }
        }
        drop(students);
        // Mirrors ON CONFLICT DO NOTHING: linking twice keeps one profile row.
        let mut profiles = self.profiles.lock().unwrap();
        profiles
            .entry(account_id.clone())
            .or_insert_with(|| Profile {
                account_id: account_id.clone(),
                email: email.to_string(),
                display_name: display_name.to_string(),
                is_admin: false,
            });
        Ok(())
    }
}
