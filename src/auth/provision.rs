//! Just-in-time provisioning of backing accounts for students.
//!
//! A student exists as a classroom row long before the identity provider has
//! heard of them. On first successful passport-code use we create the
//! provider account and the local backing records, then wait out the
//! provider's replication delay before letting resolution continue.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::error::AuthError;
use super::provider::{IdentityProvider, ProviderError};
use super::store::BackingStore;
use super::types::{AccountId, StudentRef};

pub struct JitProvisioner {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn BackingStore>,
    email_domain: String,
    poll_attempts: u32,
    poll_backoff: Duration,
}

impl JitProvisioner {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn BackingStore>,
        email_domain: String,
        poll_attempts: u32,
        poll_backoff: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            email_domain,
            poll_attempts: poll_attempts.max(1),
            poll_backoff,
        }
    }

    /// Deterministic address derived from the student's stable id; this is
    /// what makes provisioning idempotent.
    #[must_use]
    pub fn synthesized_email(&self, student_id: Uuid) -> String {
        format!("student-{student_id}@{}", self.email_domain)
    }

    /// Ensure a backing account exists for the student and return its id.
    ///
    /// Idempotent: an already-provisioned student (or a retry after a partial
    /// earlier run) converges on the same account without duplicate rows.
    ///
    /// # Errors
    /// `ProviderUnavailable` when the provider cannot be reached for the
    /// initial lookup/creation; `ProvisioningFailed` once the visibility poll
    /// is exhausted (retryable by the caller).
    #[instrument(skip_all, fields(student_id = %student.student_id))]
    pub async fn ensure_student_account(
        &self,
        student: &StudentRef,
    ) -> Result<AccountId, AuthError> {
        if let Some(account_id) = &student.account_id {
            return Ok(account_id.clone());
        }

        let email = self.synthesized_email(student.student_id);

        // A previous run may have created the account but crashed before
        // linking it locally; reuse it instead of creating a duplicate.
        let account_id = match self.provider.lookup_account_by_email(&email).await {
            Ok(Some(existing)) => existing,
            Ok(None) => {
                let metadata = json!({
                    "role": "student",
                    "student_id": student.student_id,
                    "class_id": student.class_id,
                });
                let created = self
                    .provider
                    .create_account(&email, metadata)
                    .await
                    .map_err(map_provider_error)?;
                info!(account_id = %created, "Provisioned student account");

                // A concurrent provisioner may have won the race for the same
                // email; whatever account the poll surfaces is the one to use.
                self.await_visibility(&email).await?
            }
            Err(err) => return Err(map_provider_error(err)),
        };

        self.store
            .create_student_backing_records(
                student.student_id,
                &account_id,
                &email,
                &student.display_name,
            )
            .await?;

        Ok(account_id)
    }

    /// Poll until the freshly created account is readable. The provider is
    /// eventually consistent; the very next step of this logical transaction
    /// must be able to see the row.
    async fn await_visibility(&self, email: &str) -> Result<AccountId, AuthError> {
        for attempt in 1..=self.poll_attempts {
            match self.provider.lookup_account_by_email(email).await {
                Ok(Some(visible)) => return Ok(visible),
                Ok(None) => {}
                Err(err) => {
                    warn!(attempt, "Account visibility check failed: {err}");
                }
            }
            if attempt < self.poll_attempts {
                sleep(self.poll_backoff).await;
            }
        }
        warn!(
            attempts = self.poll_attempts,
            "Provisioned account never became visible"
        );
        Err(AuthError::ProvisioningFailed)
    }
}

fn map_provider_error(err: ProviderError) -> AuthError {
    match err {
        ProviderError::Transport(_) => AuthError::ProviderUnavailable,
        ProviderError::Rejected | ProviderError::Protocol(_) => AuthError::ProvisioningFailed,
    }
}
