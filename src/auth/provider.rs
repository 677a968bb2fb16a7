//! Outbound client for the external identity provider.
//!
//! The provider owns bearer-token verification and account creation. Calls
//! must distinguish transport failure (unreachable, retryable by the caller)
//! from rejection (terminal for the presented credential).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;
use url::Url;

use super::types::{AccountId, RawPrincipal, Role};

const SERVICE_TOKEN_HEADER: &str = "x-service-token";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Provider unreachable or erroring internally; the credential was not
    /// judged. Surfaces as 503.
    #[error("identity provider unavailable: {0}")]
    Transport(String),

    /// Provider reachable and it rejected the credential. Terminal.
    #[error("credential rejected by identity provider")]
    Rejected,

    /// Provider answered with something we cannot parse.
    #[error("malformed identity provider response: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<RawPrincipal, ProviderError>;

    async fn create_account(
        &self,
        email: &str,
        metadata: Value,
    ) -> Result<AccountId, ProviderError>;

    async fn lookup_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountId>, ProviderError>;
}

/// JSON-over-HTTP provider client, authenticated with a service token.
pub struct HttpIdentityProvider {
    client: Client,
    base_url: Url,
    service_token: SecretString,
}

#[derive(Deserialize)]
struct VerifyResponse {
    account_id: String,
    #[serde(default)]
    claims: Value,
}

#[derive(Deserialize)]
struct AccountResponse {
    account_id: String,
}

impl HttpIdentityProvider {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: Url, service_token: SecretString) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(crate::api::APP_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url,
            service_token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|err| ProviderError::Protocol(format!("invalid provider URL: {err}")))
    }
}

/// Map a non-success provider status. 5xx means the provider did not judge
/// the request; 4xx means it did and said no.
fn classify_status(status: StatusCode) -> ProviderError {
    if status.is_server_error() {
        ProviderError::Transport(format!("provider returned {status}"))
    } else {
        ProviderError::Rejected
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    // The raw token is never logged; skip_all keeps it out of span fields.
    #[instrument(skip_all)]
    async fn verify_token(&self, token: &str) -> Result<RawPrincipal, ProviderError> {
        let url = self.endpoint("v1/token/verify")?;
        let response = self
            .client
            .post(url)
            .header(SERVICE_TOKEN_HEADER, self.service_token.expose_secret())
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Protocol(err.to_string()))?;

        Ok(RawPrincipal {
            account_id: body.account_id,
            role_claim: body.claims["role"].as_str().and_then(Role::from_claim),
            email: body.claims["email"].as_str().map(str::to_string),
        })
    }

    #[instrument(skip_all, fields(email))]
    async fn create_account(
        &self,
        email: &str,
        metadata: Value,
    ) -> Result<AccountId, ProviderError> {
        let url = self.endpoint("v1/accounts")?;
        let response = self
            .client
            .post(url)
            .header(SERVICE_TOKEN_HEADER, self.service_token.expose_secret())
            .json(&json!({ "email": email, "metadata": metadata }))
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body: AccountResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Protocol(err.to_string()))?;
        Ok(body.account_id)
    }

    #[instrument(skip_all, fields(email))]
    async fn lookup_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountId>, ProviderError> {
        let url = self.endpoint("v1/accounts/by-email")?;
        let response = self
            .client
            .get(url)
            .query(&[("email", email)])
            .header(SERVICE_TOKEN_HEADER, self.service_token.expose_secret())
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body: AccountResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Protocol(err.to_string()))?;
        Ok(Some(body.account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_classify_as_transport() {
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            ProviderError::Transport(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            ProviderError::Transport(_)
        ));
    }

    #[test]
    fn client_errors_classify_as_rejection() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED),
            ProviderError::Rejected
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN),
            ProviderError::Rejected
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST),
            ProviderError::Rejected
        ));
    }

    #[test]
    fn endpoint_joins_relative_paths() {
        let provider = HttpIdentityProvider::new(
            Url::parse("https://idp.example.com/").expect("valid url"),
            SecretString::from("svc-token".to_string()),
        )
        .expect("client builds");
        let url = provider.endpoint("v1/token/verify").expect("joins");
        assert_eq!(url.as_str(), "https://idp.example.com/v1/token/verify");
    }
}
