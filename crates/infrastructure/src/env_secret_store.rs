//! Environment-backed secret store for development.

use async_trait::async_trait;

use elevara_application::SecretStore;
use elevara_core::AppResult;

/// Resolves secret paths to environment variables: every character outside
/// `[A-Za-z0-9]` becomes `_` and the result is upper-cased, so
/// `smtp/password` reads `SMTP_PASSWORD`.
#[derive(Clone, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    /// Creates a new environment secret store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn variable_name(secret_path: &str) -> String {
        secret_path
            .chars()
            .map(|character| {
                if character.is_ascii_alphanumeric() {
                    character.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, secret_path: &str) -> AppResult<Option<String>> {
        Ok(std::env::var(Self::variable_name(secret_path)).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::EnvSecretStore;

    #[test]
    fn paths_map_to_upper_snake_case() {
        assert_eq!(
            EnvSecretStore::variable_name("smtp/password"),
            "SMTP_PASSWORD"
        );
        assert_eq!(
            EnvSecretStore::variable_name("projects/p-1/secrets/mail"),
            "PROJECTS_P_1_SECRETS_MAIL"
        );
    }
}
