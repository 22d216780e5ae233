use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Verified principal behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    uid: String,
    email: Option<String>,
}

impl CallerIdentity {
    pub(crate) fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Tenant key for the record store.
    pub fn owner(&self) -> OwnerId {
        OwnerId(self.uid.clone())
    }
}

/// Tenant key. Only obtainable from a [`CallerIdentity`], so every store call
/// is tied to a verified caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("missing Authorization header")]
    MissingCredential,
    #[error("Authorization header is not a Bearer token")]
    InvalidScheme,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

impl From<jsonwebtoken::errors::Error> for IdentityError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        IdentityError::InvalidToken(e.to_string())
    }
}

/// Claims shared by both verifiers.
#[derive(Debug, Deserialize)]
pub(crate) struct IdTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl TryFrom<IdTokenClaims> for CallerIdentity {
    type Error = IdentityError;

    fn try_from(claims: IdTokenClaims) -> Result<Self, Self::Error> {
        if claims.sub.trim().is_empty() {
            return Err(IdentityError::InvalidToken("empty subject".into()));
        }
        Ok(CallerIdentity::new(claims.sub, claims.email))
    }
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<CallerIdentity, IdentityError>;
}
