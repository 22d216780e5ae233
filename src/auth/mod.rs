mod extractors;
mod identity;
mod jwks;
mod secret;

use std::sync::Arc;

use crate::config::IdentityConfig;

pub use extractors::AuthUser;
pub use identity::{CallerIdentity, IdentityError, IdentityVerifier, OwnerId};
pub use jwks::JwksVerifier;
pub use secret::SharedSecretVerifier;

/// Builds the verifier selected by configuration.
pub fn verifier_from_config(
    config: &IdentityConfig,
) -> Result<Arc<dyn IdentityVerifier>, IdentityError> {
    let verifier: Arc<dyn IdentityVerifier> = match config {
        IdentityConfig::Jwks {
            project_id,
            jwks_url,
            issuer,
        } => Arc::new(JwksVerifier::new(jwks_url, issuer, project_id)?),
        IdentityConfig::SharedSecret {
            secret,
            issuer,
            audience,
        } => Arc::new(SharedSecretVerifier::new(secret, issuer, audience)),
    };
    Ok(verifier)
}
