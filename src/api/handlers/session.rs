//! Session introspection and revocation endpoints.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::auth::{require_auth, Authenticated, AuthError, AuthState};

/// Names the session to revoke on logout. Optional; without it only the
/// session registered for the logout request itself is dropped.
pub const SESSION_ID_HEADER: &str = "x-session-id";

#[derive(ToSchema, Serialize, Debug)]
pub struct SessionResponse {
    session_id: String,
    account_id: String,
    role: String,
    email: String,
    display_name: String,
    is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    class_id: Option<String>,
    active_sessions: usize,
}

impl SessionResponse {
    fn new(auth: &Authenticated, active_sessions: usize) -> Self {
        let principal = &auth.principal;
        let display_name = principal
            .profile()
            .map(|profile| profile.display_name.clone())
            .or_else(|| {
                principal
                    .student_ref()
                    .map(|student| student.display_name.clone())
            })
            .unwrap_or_default();
        Self {
            session_id: auth.session_id.clone(),
            account_id: principal.account_id.clone(),
            role: principal.role.as_str().to_string(),
            email: principal.email.clone(),
            display_name,
            is_admin: principal.is_admin,
            class_id: principal.class_id().map(|id| id.to_string()),
            active_sessions,
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Resolved principal for the presented credential", body = SessionResponse),
        (status = 401, description = "No or malformed credential"),
        (status = 403, description = "Invalid credential or misconfigured account"),
        (status = 429, description = "Too many failed attempts"),
        (status = 503, description = "Identity provider unavailable")
    ),
    tag = "auth"
)]
pub async fn session(
    state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, AuthError> {
    let auth = require_auth(&state, &headers).await?;
    let active = state.sessions().count(&auth.principal.account_id);
    Ok(Json(SessionResponse::new(&auth, active)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "No or malformed credential"),
        (status = 403, description = "Invalid credential or misconfigured account")
    ),
    tag = "auth"
)]
pub async fn logout(
    state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
) -> Result<StatusCode, AuthError> {
    let auth = require_auth(&state, &headers).await?;

    // Resolution registered a session for this request; drop it again so a
    // logout round trip leaves the account's count unchanged.
    state
        .sessions()
        .revoke(&auth.principal.account_id, &auth.session_id);

    if let Some(target) = headers
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        state.sessions().revoke(&auth.principal.account_id, target);
    }

    info!(account_id = %auth.principal.account_id, "Session revoked");
    Ok(StatusCode::NO_CONTENT)
}
