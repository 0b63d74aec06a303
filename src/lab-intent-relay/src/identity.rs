//! Federated identity of the caller, as injected by the trusted session layer
//! in front of the relay.

use std::fmt;

use alloy_primitives::{Address, B256};
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::hasher;

pub const ASSERTION_HEADER: &str = "x-federated-assertion";
pub const ORGANIZATION_HEADER: &str = "x-federated-organization";
pub const PUC_HEADER: &str = "x-federated-puc";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("missing federated identity header `{0}`")]
    MissingHeader(&'static str),
    #[error("federated assertion is not valid base64")]
    MalformedAssertion,
    #[error("organization `{0}` has no registered institution")]
    UnknownInstitution(String),
    #[error("intent executor {declared} is not the institution's executor {expected}")]
    ExecutorMismatch { expected: Address, declared: Address },
    #[error("intent `{0}` does not match the signed-in user")]
    SubjectMismatch(&'static str),
}

impl IdentityError {
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::MissingHeader(_) => "IDENTITY_REQUIRED",
            IdentityError::MalformedAssertion => "IDENTITY_MALFORMED",
            IdentityError::UnknownInstitution(_) => "INSTITUTION_NOT_REGISTERED",
            IdentityError::ExecutorMismatch { .. } => "EXECUTOR_MISMATCH",
            IdentityError::SubjectMismatch(_) => "IDENTITY_MISMATCH",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    assertion: Vec<u8>,
    organization: String,
    puc: String,
}

impl FederatedIdentity {
    pub fn new(assertion: Vec<u8>, organization: &str, puc: &str) -> Self {
        Self {
            assertion,
            organization: organization.trim().to_lowercase(),
            puc: puc.trim().to_string(),
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, IdentityError> {
        let encoded = header(headers, ASSERTION_HEADER)?;
        let assertion = STANDARD
            .decode(encoded)
            .map_err(|_| IdentityError::MalformedAssertion)?;
        if assertion.is_empty() {
            return Err(IdentityError::MalformedAssertion);
        }
        Ok(Self::new(
            assertion,
            header(headers, ORGANIZATION_HEADER)?,
            header(headers, PUC_HEADER)?,
        ))
    }

    /// `schacHomeOrganization`, lowercased.
    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// `schacPersonalUniqueCode` of the user.
    pub fn puc(&self) -> &str {
        &self.puc
    }

    pub fn assertion_hash(&self) -> B256 {
        hasher::assertion_hash(&self.assertion)
    }

    /// Assertion re-encoded for the ceremony service.
    pub fn assertion_base64(&self) -> String {
        STANDARD.encode(&self.assertion)
    }
}

impl fmt::Debug for FederatedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedIdentity")
            .field("organization", &self.organization)
            .finish_non_exhaustive()
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, IdentityError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(IdentityError::MissingHeader(name))
}
