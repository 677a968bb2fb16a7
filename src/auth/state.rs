//! Auth configuration and the process-wide shared state.

use std::sync::Arc;
use std::time::Duration;

use super::lockout::{spawn_sweeper, LockoutGuard, LockoutPolicy};
use super::profile_cache::ProfileCache;
use super::provider::IdentityProvider;
use super::provision::JitProvisioner;
use super::sessions::SessionTracker;
use super::store::BackingStore;

const DEFAULT_PROFILE_CACHE_TTL_SECONDS: u64 = 5 * 60;
const DEFAULT_PROFILE_CACHE_CAPACITY: usize = 1024;
const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 5;
const DEFAULT_STUDENT_EMAIL_DOMAIN: &str = "students.rollcall.dev";
const DEFAULT_PROVISION_POLL_ATTEMPTS: u32 = 5;
const DEFAULT_PROVISION_POLL_BACKOFF_MS: u64 = 100;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    profile_cache_ttl: Duration,
    profile_cache_capacity: usize,
    lockout: LockoutPolicy,
    max_concurrent_sessions: usize,
    student_email_domain: String,
    provision_poll_attempts: u32,
    provision_poll_backoff: Duration,
    sweep_interval: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            profile_cache_ttl: Duration::from_secs(DEFAULT_PROFILE_CACHE_TTL_SECONDS),
            profile_cache_capacity: DEFAULT_PROFILE_CACHE_CAPACITY,
            lockout: LockoutPolicy::default(),
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
            student_email_domain: DEFAULT_STUDENT_EMAIL_DOMAIN.to_string(),
            provision_poll_attempts: DEFAULT_PROVISION_POLL_ATTEMPTS,
            provision_poll_backoff: Duration::from_millis(DEFAULT_PROVISION_POLL_BACKOFF_MS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS),
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_profile_cache_ttl(mut self, ttl: Duration) -> Self {
        self.profile_cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_profile_cache_capacity(mut self, capacity: usize) -> Self {
        self.profile_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_lockout_policy(mut self, policy: LockoutPolicy) -> Self {
        self.lockout = policy;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_sessions(mut self, max: usize) -> Self {
        self.max_concurrent_sessions = max;
        self
    }

    #[must_use]
    pub fn with_student_email_domain(mut self, domain: String) -> Self {
        self.student_email_domain = domain;
        self
    }

    #[must_use]
    pub fn with_provision_poll(mut self, attempts: u32, backoff: Duration) -> Self {
        self.provision_poll_attempts = attempts;
        self.provision_poll_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn lockout_policy(&self) -> LockoutPolicy {
        self.lockout
    }

    #[must_use]
    pub fn student_email_domain(&self) -> &str {
        &self.student_email_domain
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

/// Process-wide auth state: the shared structures plus the outbound seams.
pub struct AuthState {
    config: AuthConfig,
    profile_cache: ProfileCache,
    lockout: Arc<LockoutGuard>,
    sessions: SessionTracker,
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn BackingStore>,
    provisioner: JitProvisioner,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn BackingStore>,
    ) -> Self {
        let profile_cache =
            ProfileCache::new(config.profile_cache_ttl, config.profile_cache_capacity);
        let lockout = Arc::new(LockoutGuard::new(config.lockout));
        let sessions = SessionTracker::new(config.max_concurrent_sessions);
        let provisioner = JitProvisioner::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            config.student_email_domain.clone(),
            config.provision_poll_attempts,
            config.provision_poll_backoff,
        );
        Self {
            config,
            profile_cache,
            lockout,
            sessions,
            provider,
            store,
            provisioner,
        }
    }

    /// Start the periodic lockout-record sweep. Must run inside a tokio
    /// runtime; separated from `new` so tests can construct state without one.
    pub fn start_sweeper(&self) {
        spawn_sweeper(Arc::clone(&self.lockout), self.config.sweep_interval);
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn profile_cache(&self) -> &ProfileCache {
        &self.profile_cache
    }

    #[must_use]
    pub fn lockout(&self) -> &LockoutGuard {
        &self.lockout
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    #[must_use]
    pub fn provider(&self) -> &dyn IdentityProvider {
        self.provider.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> &dyn BackingStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn provisioner(&self) -> &JitProvisioner {
        &self.provisioner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{FakeProvider, FakeStore};

    #[test]
    fn config_defaults_and_overrides() {
        let config = AuthConfig::new();
        assert_eq!(
            config.profile_cache_ttl,
            Duration::from_secs(DEFAULT_PROFILE_CACHE_TTL_SECONDS)
        );
        assert_eq!(config.profile_cache_capacity, DEFAULT_PROFILE_CACHE_CAPACITY);
        assert_eq!(config.student_email_domain(), DEFAULT_STUDENT_EMAIL_DOMAIN);

        let config = config
            .with_profile_cache_ttl(Duration::from_secs(30))
            .with_profile_cache_capacity(16)
            .with_max_concurrent_sessions(2)
            .with_student_email_domain("classroom.local".to_string())
            .with_provision_poll(3, Duration::from_millis(50))
            .with_sweep_interval(Duration::from_secs(5));

        assert_eq!(config.profile_cache_ttl, Duration::from_secs(30));
        assert_eq!(config.profile_cache_capacity, 16);
        assert_eq!(config.max_concurrent_sessions, 2);
        assert_eq!(config.student_email_domain(), "classroom.local");
        assert_eq!(config.provision_poll_attempts, 3);
        assert_eq!(config.sweep_interval(), Duration::from_secs(5));
    }

    #[test]
    fn state_constructs_with_doubles() {
        let state = AuthState::new(
            AuthConfig::new(),
            Arc::new(FakeProvider::default()),
            Arc::new(FakeStore::default()),
        );
        assert!(state.profile_cache().is_empty());
        assert_eq!(state.sessions().tracked_accounts(), 0);
        assert_eq!(state.lockout().tracked_subjects(), 0);
    }
}
