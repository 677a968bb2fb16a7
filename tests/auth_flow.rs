//! End-to-end exercises of the resolution pipeline with in-memory doubles:
//! lockout under repeated failures, just-in-time provisioning against an
//! eventually consistent provider, and session bookkeeping.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
use uuid::Uuid;

use rollcall::auth::lockout::LockoutPolicy;
use rollcall::auth::testing::{FakeProvider, FakeStore};
use rollcall::auth::types::{RawPrincipal, Role, StudentRef};
use rollcall::auth::{authenticate, require_auth, AuthConfig, AuthError, AuthState};

fn student(code: &str) -> StudentRef {
    StudentRef {
        student_id: Uuid::new_v4(),
        class_id: Uuid::new_v4(),
        display_name: "Arnold".to_string(),
        passport_code: code.to_string(),
        account_id: None,
    }
}

fn passport_headers(code: &str, client_ip: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-passport-code", HeaderValue::from_str(code).expect("code"));
    headers.insert("x-forwarded-for", HeaderValue::from_str(client_ip).expect("ip"));
    headers.insert("user-agent", HeaderValue::from_static("lab-browser/1.0"));
    headers
}

fn state(provider: FakeProvider, store: FakeStore, config: AuthConfig) -> AuthState {
    AuthState::new(config, Arc::new(provider), Arc::new(store))
}

#[tokio::test]
async fn lockout_rejects_even_the_correct_code_after_repeated_failures() {
    let store = FakeStore::default();
    store.add_student(student("FOX-7K2"));
    let state = state(
        FakeProvider::default(),
        store,
        AuthConfig::new().with_provision_poll(3, Duration::from_millis(5)),
    );

    // Default policy: five failures in the window trigger the lock.
    for attempt in 1..=5 {
        let err = require_auth(&state, &passport_headers("FOX-ZZZ", "10.1.1.1"))
            .await
            .expect_err("wrong code");
        if attempt < 5 {
            assert!(matches!(err, AuthError::InvalidCredential), "attempt {attempt}");
        } else {
            assert!(matches!(err, AuthError::Locked { .. }), "attempt {attempt}");
        }
    }

    // The correct code from the locked client is rejected with a time hint.
    let err = require_auth(&state, &passport_headers("FOX-7K2", "10.1.1.1"))
        .await
        .expect_err("locked");
    match err {
        AuthError::Locked { remaining } => {
            assert!(remaining <= Duration::from_secs(15 * 60));
            assert!(remaining > Duration::from_secs(10 * 60));
        }
        other => panic!("expected lock, got {other:?}"),
    }

    // A different client is unaffected.
    require_auth(&state, &passport_headers("FOX-7K2", "10.2.2.2"))
        .await
        .expect("other client resolves");
}

#[tokio::test]
async fn malformed_codes_count_as_failures() {
    let state = state(FakeProvider::default(), FakeStore::default(), AuthConfig::new());

    for _ in 0..4 {
        let err = require_auth(&state, &passport_headers("not-a-code", "10.1.1.1"))
            .await
            .expect_err("malformed");
        assert!(matches!(err, AuthError::MalformedCredential));
    }
    let err = require_auth(&state, &passport_headers("not-a-code", "10.1.1.1"))
        .await
        .expect_err("fifth failure");
    assert!(matches!(err, AuthError::Locked { .. }));
}

#[tokio::test]
async fn jit_provisioning_rides_out_provider_replication_delay() {
    let provider = FakeProvider::default();
    provider.set_replication_delay(Duration::from_millis(200));
    let store = FakeStore::default();
    store.add_student(student("OWL-3B9"));
    let state = state(
        provider,
        store,
        AuthConfig::new().with_provision_poll(5, Duration::from_millis(100)),
    );

    let auth = require_auth(&state, &passport_headers("OWL-3B9", "10.1.1.1"))
        .await
        .expect("provisioned despite delay");
    assert_eq!(auth.principal.role, Role::Student);
    assert!(auth.principal.email.starts_with("student-"));
}

#[tokio::test]
async fn jit_provisioning_exhausts_poll_when_replication_never_catches_up() {
    let provider = FakeProvider::default();
    provider.set_replication_delay(Duration::from_secs(60));
    let store = FakeStore::default();
    store.add_student(student("OWL-3B9"));
    let state = state(
        provider,
        store,
        AuthConfig::new().with_provision_poll(2, Duration::from_millis(10)),
    );

    let err = require_auth(&state, &passport_headers("OWL-3B9", "10.1.1.1"))
        .await
        .expect_err("poll exhausted");
    assert!(matches!(err, AuthError::ProvisioningFailed));
}

#[tokio::test]
async fn repeated_logins_reuse_one_provider_account() {
    let provider = FakeProvider::default();
    let store = FakeStore::default();
    store.add_student(student("BEE-4J8"));
    let state = state(
        provider,
        store,
        AuthConfig::new().with_provision_poll(3, Duration::from_millis(5)),
    );

    let first = require_auth(&state, &passport_headers("BEE-4J8", "10.1.1.1"))
        .await
        .expect("first login");
    let second = require_auth(&state, &passport_headers("BEE-4J8", "10.1.1.1"))
        .await
        .expect("second login");

    assert_eq!(first.principal.account_id, second.principal.account_id);
}

#[tokio::test]
async fn session_cap_bounds_concurrent_logins() {
    let store = FakeStore::default();
    store.add_student(student("CAT-9Q4"));
    let state = state(
        FakeProvider::default(),
        store,
        AuthConfig::new()
            .with_provision_poll(3, Duration::from_millis(5))
            .with_max_concurrent_sessions(2),
    );

    let mut account_id = String::new();
    for _ in 0..4 {
        let auth = require_auth(&state, &passport_headers("CAT-9Q4", "10.1.1.1"))
            .await
            .expect("login");
        account_id = auth.principal.account_id;
    }
    assert_eq!(state.sessions().count(&account_id), 2);
}

#[tokio::test]
async fn anonymous_requests_resolve_to_none() {
    let state = state(FakeProvider::default(), FakeStore::default(), AuthConfig::new());
    let outcome = authenticate(&state, &HeaderMap::new())
        .await
        .expect("no credential is not an error");
    assert!(outcome.is_none());
}

#[tokio::test]
async fn provider_outage_does_not_touch_lockout_state() {
    let provider = FakeProvider::default();
    provider.set_unavailable(true);
    let state = state(provider, FakeStore::default(), AuthConfig::new());

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-1"));
    let err = require_auth(&state, &headers).await.expect_err("outage");
    assert!(matches!(err, AuthError::ProviderUnavailable));
    assert_eq!(state.lockout().tracked_subjects(), 0);
}

#[tokio::test]
async fn bearer_path_is_not_gated_by_code_lockout() {
    // Lockout protects the guessable credential only; a locked client
    // address must not block a teacher's bearer login from the same machine.
    let provider = FakeProvider::default();
    provider.add_token(
        "tok-teacher",
        RawPrincipal {
            account_id: "acc-t".to_string(),
            role_claim: Some(Role::Teacher),
            email: Some("teacher@example.com".to_string()),
        },
    );
    let store = FakeStore::default();
    store.add_profile(rollcall::auth::types::Profile {
        account_id: "acc-t".to_string(),
        email: "teacher@example.com".to_string(),
        display_name: "Ms. Frizzle".to_string(),
        is_admin: false,
    });
    let state = state(
        provider,
        store,
        AuthConfig::new().with_lockout_policy(LockoutPolicy {
            max_attempts: 2,
            attempt_window: Duration::from_secs(60),
            lockout_duration: Duration::from_secs(60),
        }),
    );

    // Two code failures lock the client address.
    for _ in 0..2 {
        require_auth(&state, &passport_headers("FOX-ZZZ", "10.1.1.1"))
            .await
            .expect_err("wrong code");
    }

    // The teacher's bearer login from the same address still works; lockout
    // gates only the code path.
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-teacher"));
    headers.insert("x-forwarded-for", HeaderValue::from_static("10.1.1.1"));
    let auth = require_auth(&state, &headers).await.expect("bearer login");
    assert_eq!(auth.principal.role, Role::Teacher);
}

#[tokio::test]
async fn provisioning_creates_backing_records_exactly_once() {
    let provider = FakeProvider::default();
    let store = FakeStore::default();
    store.add_student(student("ELK-2M7"));
    let state = state(
        provider,
        store,
        AuthConfig::new().with_provision_poll(3, Duration::from_millis(5)),
    );

    require_auth(&state, &passport_headers("ELK-2M7", "10.1.1.1"))
        .await
        .expect("first login provisions");
    require_auth(&state, &passport_headers("ELK-2M7", "10.1.1.1"))
        .await
        .expect("second login reuses");

    let store = state.store();
    let linked = store
        .fetch_student_by_passport_code("ELK-2M7")
        .await
        .expect("lookup")
        .expect("student");
    assert!(linked.account_id.is_some());
}

#[tokio::test]
async fn provisioning_counts_one_account_creation() {
    let provider = Arc::new(FakeProvider::default());
    let store = FakeStore::default();
    store.add_student(student("RAM-5X1"));
    let state = AuthState::new(
        AuthConfig::new().with_provision_poll(3, Duration::from_millis(5)),
        Arc::clone(&provider) as Arc<dyn rollcall::auth::provider::IdentityProvider>,
        Arc::new(store),
    );

    require_auth(&state, &passport_headers("RAM-5X1", "10.1.1.1"))
        .await
        .expect("first login");
    require_auth(&state, &passport_headers("RAM-5X1", "10.1.1.1"))
        .await
        .expect("second login");

    assert_eq!(provider.created_accounts.load(Ordering::SeqCst), 1);
}
