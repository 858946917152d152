//! Signing and verification of reviewer-addressed approval tokens.
//!
//! An MPA request travels to its reviewers as an RS256 JWT; there is no
//! server-side request store. The token is single-purpose and replayable
//! until expiry, so the downstream IAM write carries the replay guard.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use elevara_core::{AppError, AppResult, ProjectRoleBinding, RoleBinding, UserId};
use elevara_domain::{ActivationRequestId, MpaActivationRequest};

use crate::ports::{JwtSigner, KeySetSource};

/// Options of the token service.
#[derive(Debug, Clone)]
pub struct TokenServiceOptions {
    /// Service account whose platform-managed key signs tokens; the `iss`
    /// claim.
    pub signing_service_account: UserId,
    /// Activation URL prefix; both the `aud` claim and the base of approval
    /// links.
    pub audience: String,
}

/// A signed approval token with its lifetime.
#[derive(Debug, Clone)]
pub struct SignedApproval {
    /// Compact JWT, un-obfuscated.
    pub token: String,
    /// When the token was issued.
    pub issued_at: DateTime<Utc>,
    /// When the token expires; equals the request end.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApprovalClaims {
    aud: String,
    iss: String,
    exp: i64,
    iat: i64,
    jti: String,
    beneficiary: String,
    reviewers: Vec<String>,
    justification: String,
    role: String,
    resource: String,
    start: i64,
    end: i64,
}

/// Replaces the `.` separators so tokens survive casual inspection in query
/// strings; `~` is URL-safe and never occurs in base64url.
#[must_use]
pub fn obfuscate_token(token: &str) -> String {
    token.replace('.', "~")
}

/// Inverse of [`obfuscate_token`].
#[must_use]
pub fn deobfuscate_token(wire_token: &str) -> String {
    wire_token.replace('~', ".")
}

/// Serializes MPA requests into signed approval tokens and back.
pub struct TokenService {
    signer: Arc<dyn JwtSigner>,
    key_set_source: Arc<dyn KeySetSource>,
    options: TokenServiceOptions,
}

impl TokenService {
    /// Creates a token service over the signer and key-set ports.
    #[must_use]
    pub fn new(
        signer: Arc<dyn JwtSigner>,
        key_set_source: Arc<dyn KeySetSource>,
        options: TokenServiceOptions,
    ) -> Self {
        Self {
            signer,
            key_set_source,
            options,
        }
    }

    /// Returns the configured audience.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.options.audience
    }

    /// Builds the approval URL delivered to reviewers.
    #[must_use]
    pub fn approval_url(&self, approval: &SignedApproval) -> String {
        format!(
            "{}?activation={}",
            self.options.audience,
            obfuscate_token(&approval.token)
        )
    }

    /// Signs an MPA request.
    pub async fn sign(&self, request: &MpaActivationRequest) -> AppResult<SignedApproval> {
        let issued_at = Utc::now();
        let expires_at = request.end_time();

        let claims = ApprovalClaims {
            aud: self.options.audience.clone(),
            iss: self.options.signing_service_account.email.clone(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
            jti: request.id().as_str().to_owned(),
            beneficiary: request.requesting_user().email.clone(),
            reviewers: request
                .reviewers()
                .iter()
                .map(|reviewer| reviewer.email.clone())
                .collect(),
            justification: request.justification().to_owned(),
            role: request.entitlement().role().to_owned(),
            resource: request
                .entitlement()
                .role_binding()
                .resource_full_name()
                .to_owned(),
            start: request.start_time().timestamp(),
            end: request.end_time().timestamp(),
        };

        let payload = serde_json::to_value(&claims).map_err(|error| {
            AppError::Internal(format!("failed to serialize approval claims: {error}"))
        })?;

        let token = self
            .signer
            .sign_jwt(&self.options.signing_service_account, &payload)
            .await?;

        Ok(SignedApproval {
            token,
            issued_at,
            expires_at,
        })
    }

    /// Verifies a token from the wire and reconstructs its request.
    ///
    /// RS256 is the only accepted algorithm; the audience must equal
    /// `expected_audience` and the token must be unexpired. Any mismatch
    /// fails with [`AppError::InvalidToken`].
    pub async fn verify(
        &self,
        expected_audience: &str,
        wire_token: &str,
    ) -> AppResult<MpaActivationRequest> {
        let token = deobfuscate_token(wire_token);

        let header = decode_header(&token)
            .map_err(|error| AppError::InvalidToken(format!("malformed token: {error}")))?;

        let key_set = self.key_set_source.fetch_key_set().await?;

        let candidate_keys: Vec<DecodingKey> = key_set
            .keys
            .iter()
            .filter(|key| match (&header.kid, &key.common.key_id) {
                (Some(kid), Some(key_id)) => kid == key_id,
                _ => true,
            })
            .filter_map(|key| DecodingKey::from_jwk(key).ok())
            .collect();

        if candidate_keys.is_empty() {
            return Err(AppError::InvalidToken(
                "no verification key matches the token".to_owned(),
            ));
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[expected_audience]);
        validation.set_required_spec_claims(&["exp", "aud"]);

        let mut last_error = None;
        for key in &candidate_keys {
            match decode::<ApprovalClaims>(&token, key, &validation) {
                Ok(data) => return Self::reconstruct_request(data.claims),
                Err(error) => last_error = Some(error),
            }
        }

        Err(AppError::InvalidToken(format!(
            "token verification failed: {}",
            last_error.map_or_else(|| "no key accepted the signature".to_owned(), |error| {
                error.to_string()
            })
        )))
    }

    fn reconstruct_request(claims: ApprovalClaims) -> AppResult<MpaActivationRequest> {
        let invalid =
            |detail: String| AppError::InvalidToken(format!("inconsistent claims: {detail}"));

        let id = ActivationRequestId::parse(claims.jti)
            .map_err(|error| invalid(error.to_string()))?;
        let beneficiary =
            UserId::new(claims.beneficiary).map_err(|error| invalid(error.to_string()))?;

        let mut reviewers = BTreeSet::new();
        for reviewer in claims.reviewers {
            reviewers.insert(UserId::new(reviewer).map_err(|error| invalid(error.to_string()))?);
        }

        let entitlement =
            ProjectRoleBinding::new(RoleBinding::new(claims.resource, claims.role))
                .map_err(|error| invalid(error.to_string()))?;

        let start = DateTime::<Utc>::from_timestamp(claims.start, 0)
            .ok_or_else(|| invalid(format!("bad start epoch {}", claims.start)))?;
        let end = DateTime::<Utc>::from_timestamp(claims.end, 0)
            .ok_or_else(|| invalid(format!("bad end epoch {}", claims.end)))?;

        MpaActivationRequest::with_id(
            id,
            beneficiary,
            entitlement,
            reviewers,
            claims.justification,
            start,
            end,
        )
        .map_err(|error| invalid(error.to_string()))
    }
}
