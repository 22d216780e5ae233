use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::identity::{CallerIdentity, IdTokenClaims, IdentityError, IdentityVerifier};

#[derive(Debug, Serialize)]
struct SignedClaims<'a> {
    sub: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    iat: usize,
    exp: usize,
    iss: &'a str,
    aud: &'a str,
}

/// HS256 verifier for local development and tests.
#[derive(Clone)]
pub struct SharedSecretVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl SharedSecretVerifier {
    pub fn new(secret: &str, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Issues a token the verifier will accept until `ttl` elapses.
    pub fn sign(&self, uid: &str, email: Option<&str>, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = SignedClaims {
            sub: uid,
            email,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: &self.issuer,
            aud: &self.audience,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(uid, "token signed");
        Ok(token)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation
    }
}

#[async_trait]
impl IdentityVerifier for SharedSecretVerifier {
    async fn verify(&self, token: &str) -> Result<CallerIdentity, IdentityError> {
        let data = decode::<IdTokenClaims>(token, &self.decoding, &self.validation())?;
        debug!(uid = %data.claims.sub, "token verified");
        CallerIdentity::try_from(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn sign_and_verify_roundtrip() {
        let verifier = SharedSecretVerifier::new("dev-secret", "test-issuer", "test-aud");
        let token = verifier
            .sign("user-1", Some("a@example.com"), HOUR)
            .expect("sign");
        let caller = verifier.verify(&token).await.expect("verify");
        assert_eq!(caller.uid(), "user-1");
        assert_eq!(caller.email(), Some("a@example.com"));
        assert_eq!(caller.owner().as_str(), "user-1");
    }

    #[tokio::test]
    async fn email_is_optional() {
        let verifier = SharedSecretVerifier::new("dev-secret", "iss", "aud");
        let token = verifier.sign("user-2", None, HOUR).expect("sign");
        let caller = verifier.verify(&token).await.expect("verify");
        assert_eq!(caller.email(), None);
    }

    #[tokio::test]
    async fn rejects_wrong_issuer_or_audience() {
        let good = SharedSecretVerifier::new("same-secret", "good-iss", "good-aud");
        let bad = SharedSecretVerifier::new("same-secret", "bad-iss", "bad-aud");
        let token = good.sign("user-1", None, HOUR).expect("sign");
        let err = bad.verify(&token).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn rejects_foreign_secret_and_garbage() {
        let ours = SharedSecretVerifier::new("ours", "iss", "aud");
        let theirs = SharedSecretVerifier::new("theirs", "iss", "aud");
        let token = theirs.sign("user-1", None, HOUR).expect("sign");
        assert!(ours.verify(&token).await.is_err());
        assert!(ours.verify("not.a.token").await.is_err());
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let verifier = SharedSecretVerifier::new("dev-secret", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = SignedClaims {
            sub: "user-1",
            email: None,
            iat: now - 7200,
            exp: now - 3600,
            iss: "iss",
            aud: "aud",
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &verifier.encoding)
            .expect("encode");
        let err = verifier.verify(&token).await.unwrap_err();
        assert!(err.to_string().contains("invalid token"));
    }
}
