use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;

use elevara_core::{AppResult, UserId};

/// Remote JWT signer keyed by a service account's platform-managed key.
#[async_trait]
pub trait JwtSigner: Send + Sync {
    /// Signs a claims payload and returns the compact JWT.
    async fn sign_jwt(
        &self,
        service_account: &UserId,
        payload: &serde_json::Value,
    ) -> AppResult<String>;
}

/// Source of the public keys matching a signer.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetches the current JSON Web Key Set.
    async fn fetch_key_set(&self) -> AppResult<JwkSet>;
}

/// Secret store collaborator.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Reads a secret by path; `None` when the secret does not exist.
    async fn get_secret(&self, secret_path: &str) -> AppResult<Option<String>>;
}

/// Returns the published JWKS URL for a service account's key set.
#[must_use]
pub fn service_account_jwks_url(service_account: &UserId) -> String {
    format!(
        "https://www.googleapis.com/service_accounts/v1/metadata/jwk/{}",
        service_account.email
    )
}
