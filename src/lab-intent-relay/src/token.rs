//! Short-lived HS256 token the relay presents to an institution's ceremony
//! backend, and hands back to the client for the status polling it does there.
//!
//! The token also pins the exact intent it was minted for: registration only
//! signs a meta whose EIP-712 digest matches the `dig` claim.

use alloy_primitives::B256;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::identity::FederatedIdentity;

#[derive(Debug, thiserror::Error)]
#[error("backend token error: {0}")]
pub struct TokenError(#[from] jsonwebtoken::errors::Error);

/// JWT claims of a backend token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendClaims {
    /// `puc` of the signed-in user.
    pub sub: String,
    pub org: String,
    /// Intent request id the token is scoped to.
    pub rid: String,
    /// EIP-712 signing digest of the prepared intent meta.
    pub dig: String,
    pub iat: u64,
    pub exp: u64,
}

pub struct BackendTokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: u64,
}

impl BackendTokenIssuer {
    pub fn new(secret: &[u8], ttl: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Mint a token for `identity` scoped to the intent with `request_id` and
    /// signing digest `digest`. Returns the token and its expiry (epoch seconds).
    pub fn issue(
        &self,
        identity: &FederatedIdentity,
        request_id: B256,
        digest: B256,
        now: u64,
    ) -> Result<(String, u64), TokenError> {
        let claims = BackendClaims {
            sub: identity.puc().to_string(),
            org: identity.organization().to_string(),
            rid: request_id.to_string(),
            dig: digest.to_string(),
            iat: now,
            exp: now + self.ttl,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok((token, claims.exp))
    }

    pub fn verify(&self, token: &str) -> Result<BackendClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Ok(decode::<BackendClaims>(token, &self.decoding, &validation)?.claims)
    }
}

impl BackendClaims {
    /// Whether these claims were minted for `identity` and this exact intent.
    pub fn binds(&self, identity: &FederatedIdentity, request_id: B256, digest: B256) -> bool {
        self.sub == identity.puc()
            && self.org == identity.organization()
            && self.rid == request_id.to_string()
            && self.dig == digest.to_string()
    }
}
