//! Key-set source serving a fixed JWK set from memory.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;

use elevara_application::KeySetSource;
use elevara_core::{AppError, AppResult};

/// Serves a key set known at construction time; the verification counterpart
/// of a local signing key.
pub struct StaticKeySetSource {
    key_set: JwkSet,
}

impl StaticKeySetSource {
    /// Creates a source from an already parsed key set.
    #[must_use]
    pub fn new(key_set: JwkSet) -> Self {
        Self { key_set }
    }

    /// Creates a source holding one RSA verification key from its base64url
    /// modulus and exponent.
    pub fn from_rsa_components(
        modulus: &str,
        exponent: &str,
        key_id: Option<String>,
    ) -> AppResult<Self> {
        let jwk = serde_json::json!({
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "kid": key_id,
            "n": modulus,
            "e": exponent,
        });

        let key_set: JwkSet = serde_json::from_value(serde_json::json!({ "keys": [jwk] }))
            .map_err(|error| {
                AppError::InvalidArgument(format!("invalid RSA key components: {error}"))
            })?;

        Ok(Self { key_set })
    }

    /// Parses a source from JWKS JSON.
    pub fn from_json(json: &str) -> AppResult<Self> {
        let key_set: JwkSet = serde_json::from_str(json)
            .map_err(|error| AppError::InvalidArgument(format!("invalid JWKS JSON: {error}")))?;

        Ok(Self { key_set })
    }
}

#[async_trait]
impl KeySetSource for StaticKeySetSource {
    async fn fetch_key_set(&self) -> AppResult<JwkSet> {
        Ok(self.key_set.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::StaticKeySetSource;

    #[test]
    fn malformed_jwks_json_is_rejected() {
        assert!(StaticKeySetSource::from_json("{\"keys\": 42}").is_err());
    }

    #[test]
    fn component_construction_yields_one_key() {
        let source = StaticKeySetSource::from_rsa_components("AQAB", "AQAB", None);
        let source = source.unwrap_or_else(|_| unreachable!());
        assert_eq!(source.key_set.keys.len(), 1);
    }
}
