use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub provider_url: String,
    pub provider_token: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(provider_url: String, provider_token: SecretString) -> Self {
        Self {
            provider_url,
            provider_token,
        }
    }
}
