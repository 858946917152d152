//! Key-set source fetching a published JWKS document over HTTPS.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;

use elevara_application::{Diagnosable, DiagnosticResult, KeySetSource};
use elevara_core::{AppError, AppResult};

/// Fetches the JWKS of a signing service account from its published URL.
pub struct HttpKeySetSource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySetSource {
    /// Creates a source for a JWKS URL; see
    /// [`elevara_application::service_account_jwks_url`].
    pub fn new(url: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build the JWKS HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch_key_set(&self) -> AppResult<JwkSet> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("fetching '{}' failed: {error}", self.url))
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::ResourceNotFound(format!(
                "no key set published at '{}'",
                self.url
            )));
        }

        if !status.is_success() {
            return Err(AppError::Internal(format!(
                "fetching '{}' returned status {status}",
                self.url
            )));
        }

        response.json::<JwkSet>().await.map_err(|error| {
            AppError::Internal(format!("'{}' is not a JWKS document: {error}", self.url))
        })
    }
}

#[async_trait]
impl Diagnosable for HttpKeySetSource {
    fn name(&self) -> String {
        "verification-keys (jwks)".to_owned()
    }

    async fn run_diagnostic(&self) -> DiagnosticResult {
        match self.fetch_key_set().await {
            Ok(key_set) if !key_set.keys.is_empty() => DiagnosticResult::success(self.name()),
            Ok(_) => DiagnosticResult::failure(self.name(), "the key set is empty"),
            Err(error) => DiagnosticResult::failure(self.name(), error.to_string()),
        }
    }
}
