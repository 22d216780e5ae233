use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::identity::{CallerIdentity, IdentityError, IdentityVerifier};
use crate::error::ApiError;

/// Extracts the bearer token and verifies it, yielding the caller identity.
pub struct AuthUser(pub CallerIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<dyn IdentityVerifier>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier: Arc<dyn IdentityVerifier> = FromRef::from_ref(state);
        let result = match bearer_token(parts) {
            Ok(token) => verifier.verify(token).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(caller) => Ok(AuthUser(caller)),
            Err(e) => {
                warn!(error = %e, "request rejected: unauthenticated");
                Err(ApiError::Unauthenticated)
            }
        }
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, IdentityError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(IdentityError::MissingCredential)?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(IdentityError::InvalidScheme)
}
