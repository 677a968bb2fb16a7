//! Backing-store access for profiles and student rows.
//!
//! The trait is the narrow seam the resolver and provisioner work against;
//! `PgBackingStore` is the Postgres implementation. Passport-code uniqueness
//! lives in the database (unique constraint on `students.passport_code`),
//! with bounded generation retries here.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::passport::{self, Animal};
use super::types::{AccountId, Profile, StudentRef};

#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn fetch_profile(&self, account_id: &AccountId) -> Result<Option<Profile>>;

    async fn fetch_student_by_passport_code(&self, code: &str) -> Result<Option<StudentRef>>;

    /// Reverse lookup for legacy sessions: the provider account is known but
    /// the request carried no passport code.
    async fn fetch_student_by_account(&self, account_id: &AccountId) -> Result<Option<StudentRef>>;

    /// Create a student row with a freshly generated, globally unique
    /// passport code.
    async fn create_student(
        &self,
        class_id: Uuid,
        display_name: &str,
        animal: Animal,
    ) -> Result<StudentRef>;

    /// Link a provisioned provider account to its student row and create the
    /// profile row, as one logical unit.
    async fn create_student_backing_records(
        &self,
        student_id: Uuid,
        account_id: &AccountId,
        email: &str,
        display_name: &str,
    ) -> Result<()>;
}

pub struct PgBackingStore {
    pool: PgPool,
}

impl PgBackingStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl BackingStore for PgBackingStore {
    async fn fetch_profile(&self, account_id: &AccountId) -> Result<Option<Profile>> {
        let query = r"
            SELECT account_id, email, display_name, is_admin
            FROM profiles
            WHERE account_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch profile")?;

        Ok(row.map(|row| Profile {
            account_id: row.get("account_id"),
            email: row.get("email"),
            display_name: row.get("display_name"),
            is_admin: row.get("is_admin"),
        }))
    }

    async fn fetch_student_by_passport_code(&self, code: &str) -> Result<Option<StudentRef>> {
        let query = r"
            SELECT id, class_id, display_name, passport_code, account_id
            FROM students
            WHERE passport_code = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(query)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch student by passport code")?;

        Ok(row.map(|row| StudentRef {
            student_id: row.get("id"),
            class_id: row.get("class_id"),
            display_name: row.get("display_name"),
            passport_code: row.get("passport_code"),
            account_id: row.get("account_id"),
        }))
    }

    async fn fetch_student_by_account(&self, account_id: &AccountId) -> Result<Option<StudentRef>> {
        let query = r"
            SELECT id, class_id, display_name, passport_code, account_id
            FROM students
            WHERE account_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch student by account")?;

        Ok(row.map(|row| StudentRef {
            student_id: row.get("id"),
            class_id: row.get("class_id"),
            display_name: row.get("display_name"),
            passport_code: row.get("passport_code"),
            account_id: row.get("account_id"),
        }))
    }

    async fn create_student(
        &self,
        class_id: Uuid,
        display_name: &str,
        animal: Animal,
    ) -> Result<StudentRef> {
        let query = r"
            INSERT INTO students (id, class_id, display_name, passport_code)
            VALUES ($1, $2, $3, $4)
        ";

        // The unique constraint arbitrates collisions; retry with a fresh
        // code a bounded number of times, then fail loudly.
        for _ in 0..passport::MAX_GENERATION_ATTEMPTS {
            let student_id = Uuid::new_v4();
            let code = passport::generate_code(animal);
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT"
            );
            let result = sqlx::query(query)
                .bind(student_id)
                .bind(class_id)
                .bind(display_name)
                .bind(&code)
                .execute(&self.pool)
                .instrument(span)
                .await;

            match result {
                Ok(_) => {
                    return Ok(StudentRef {
                        student_id,
                        class_id,
                        display_name: display_name.to_string(),
                        passport_code: code,
                        account_id: None,
                    })
                }
                Err(err) if is_unique_violation(&err) => {}
                Err(err) => return Err(err).context("failed to insert student"),
            }
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
        // One transaction: the account link and the profile row land together
        // or not at all.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin provisioning transaction")?;

        let query = "UPDATE students SET account_id = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        sqlx::query(query)
            .bind(student_id)
            .bind(account_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to link student account")?;

        let query = r"
            INSERT INTO profiles (account_id, email, display_name, is_admin)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (account_id) DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        sqlx::query(query)
            .bind(account_id)
            .bind(email)
            .bind(display_name)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert student profile row")?;

        tx.commit().await.context("commit provisioning transaction")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("40001"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
