//! Error taxonomy for credential resolution and the HTTP mapping for each
//! class of failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use tracing::error;

/// Failure classes surfaced by the auth pipeline.
///
/// `NoCredential` is not a failure on optional-auth paths; callers that
/// require authentication convert it into a 401.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No credential supplied")]
    NoCredential,

    #[error("Malformed credential")]
    MalformedCredential,

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Identity provider unavailable")]
    ProviderUnavailable,

    #[error("Account not configured correctly")]
    AccountMisconfigured,

    #[error("Too many failed attempts")]
    Locked { remaining: Duration },

    #[error("Failed to provision student account")]
    ProvisioningFailed,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NoCredential | Self::MalformedCredential => StatusCode::UNAUTHORIZED,
            Self::InvalidCredential | Self::AccountMisconfigured => StatusCode::FORBIDDEN,
            Self::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Locked { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ProvisioningFailed | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            // Round up so a fresh lock reports the full configured duration.
            Self::Locked { remaining } => json!({
                "message": self.to_string(),
                "minutesRemaining": remaining.as_secs().div_ceil(60),
            }),
            Self::Internal(err) => {
                // Log the cause; the client only sees a generic message.
                error!("Internal auth error: {err:#}");
                json!({ "message": "Internal server error" })
            }
            _ => json!({ "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AuthError::NoCredential.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::MalformedCredential.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::InvalidCredential.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::AccountMisconfigured.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::ProviderUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AuthError::Locked {
                remaining: Duration::from_secs(60)
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::ProvisioningFailed.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn locked_body_reports_rounded_up_minutes_remaining() {
        let response = AuthError::Locked {
            remaining: Duration::from_secs(15 * 60 - 1),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        // 14m59s still reads as 15 minutes to the client.
        assert_eq!(body["minutesRemaining"], 15);
        assert!(body["message"].is_string());
    }
}
