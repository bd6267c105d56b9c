//! Service tokens.
//!
//! Tokens are HS256 JWTs signed with the shared server secret. The indexer
//! only checks that a token decodes under that secret; authorization is
//! decided upstream.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::refs::TenantKey;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("JWT encoding failed: {0}")]
    EncodingFailed(jsonwebtoken::errors::Error),
    #[error("Invalid token: {0}")]
    InvalidToken(jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub workspace: TenantKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl Claims {
    pub fn new(email: impl Into<String>, workspace: TenantKey) -> Self {
        Self {
            email: email.into(),
            workspace,
            extra: None,
        }
    }

    /// Sign these claims with `secret`.
    pub fn encode(&self, secret: &str) -> Result<String, TokenError> {
        encode(
            &Header::new(Algorithm::HS256),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(TokenError::EncodingFailed)
    }

    /// Decode a token signed with `secret`. Expiry is not enforced.
    pub fn decode(token: &str, secret: &str) -> Result<Self, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map(|data| data.claims)
            .map_err(TokenError::InvalidToken)
    }
}
