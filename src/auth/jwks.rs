use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::identity::{CallerIdentity, IdTokenClaims, IdentityError, IdentityVerifier};

const KEY_SET_TTL: Duration = Duration::from_secs(60 * 60);
/// Floor between fetches triggered by unknown key ids while the set is fresh.
const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

#[derive(Default)]
struct KeyCache {
    keys: Option<CachedKeys>,
    // Last fetch attempt, successful or not.
    attempted_at: Option<Instant>,
}

enum Lookup {
    Found(DecodingKey),
    /// Fresh set without the key, refetched too recently to try again.
    Unknown,
    Refetch,
}

impl KeyCache {
    fn lookup(&self, kid: &str) -> Result<Lookup, IdentityError> {
        let Some(cached) = self.keys.as_ref() else {
            return Ok(Lookup::Refetch);
        };
        if cached.fetched_at.elapsed() >= KEY_SET_TTL {
            return Ok(Lookup::Refetch);
        }
        if let Some(jwk) = cached.set.find(kid) {
            return Ok(Lookup::Found(DecodingKey::from_jwk(jwk)?));
        }
        let recently_attempted = self
            .attempted_at
            .map_or(false, |at| at.elapsed() < MIN_REFETCH_INTERVAL);
        Ok(if recently_attempted {
            Lookup::Unknown
        } else {
            Lookup::Refetch
        })
    }
}

fn unknown_kid(kid: &str) -> IdentityError {
    IdentityError::InvalidToken(format!("unknown key id {kid}"))
}

/// Verifies RS256 ID tokens issued by the identity provider against its
/// published JWK set.
pub struct JwksVerifier {
    http: reqwest::Client,
    jwks_url: String,
    issuer: String,
    audience: String,
    cache: RwLock<KeyCache>,
}

impl JwksVerifier {
    pub fn new(
        jwks_url: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::KeysUnavailable(e.to_string()))?;
        Ok(Self {
            http,
            jwks_url: jwks_url.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            cache: RwLock::new(KeyCache::default()),
        })
    }

    /// Seeds the key cache, skipping the first network fetch.
    pub fn with_keys(self, set: JwkSet) -> Self {
        self.with_keys_fetched_at(set, Instant::now())
    }

    fn with_keys_fetched_at(self, set: JwkSet, fetched_at: Instant) -> Self {
        Self {
            cache: RwLock::new(KeyCache {
                keys: Some(CachedKeys { set, fetched_at }),
                attempted_at: Some(fetched_at),
            }),
            ..self
        }
    }

    async fn fetch_keys(&self) -> Result<JwkSet, IdentityError> {
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| IdentityError::KeysUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(IdentityError::KeysUnavailable(format!(
                "key endpoint returned {}",
                response.status()
            )));
        }
        let set = response
            .json::<JwkSet>()
            .await
            .map_err(|e| IdentityError::KeysUnavailable(e.to_string()))?;
        info!(keys = set.keys.len(), "identity key set refreshed");
        Ok(set)
    }

    /// Looks up `kid`, refetching the key set when it is stale or does not
    /// know the key (provider rotation). Refetches hold the write lock, so
    /// concurrent misses wait for one fetch instead of issuing their own.
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, IdentityError> {
        match self.cache.read().await.lookup(kid)? {
            Lookup::Found(key) => return Ok(key),
            Lookup::Unknown => return Err(unknown_kid(kid)),
            Lookup::Refetch => {}
        }

        let mut cache = self.cache.write().await;
        match cache.lookup(kid)? {
            Lookup::Found(key) => return Ok(key),
            Lookup::Unknown => return Err(unknown_kid(kid)),
            Lookup::Refetch => {}
        }

        cache.attempted_at = Some(Instant::now());
        let set = self.fetch_keys().await?;
        let key = set
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()?
            .ok_or_else(|| unknown_kid(kid));
        cache.keys = Some(CachedKeys {
            set,
            fetched_at: Instant::now(),
        });
        key
    }
}

#[async_trait]
impl IdentityVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<CallerIdentity, IdentityError> {
        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::InvalidToken(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::InvalidToken("missing key id".into()))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<IdTokenClaims>(token, &key, &validation)?;
        debug!(uid = %data.claims.sub, "id token verified");
        CallerIdentity::try_from(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use time::OffsetDateTime;

    const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/rsa_test_key.pem");
    const MODULUS: &str = "owtHdiw9oHF-NSXWc2hrSh49TKjQnw3xAv26LyixXDovXY307gv-GLl0l5AU4slkJDyL4G2np_ktsoDHKUeWvzB1lqftDgxuEthZwBuHJGTtSJFKJQvhRGDFxOh208j8e8EOKQU0ezvg0M_ceTGHFkiWRiC11y1B3aPP1VtJEJMXhaxoryvguZ90iv5zm4bVsycpbIRqP4qDulCPkmkLLP1XWNp-bQsBvu7WVfLfDmd9QKDFkexnngwHvYDwBRK72Ch8dxpe0FsFsuD5XMuR5n6_bCO24KCOStrn2Z99q5y1zkQD3haboI8jTF1Q-9ZGvXb141dVs4nfTRxXRt0Zgw";
    const ISSUER: &str = "https://securetoken.google.com/food-app";

    fn key_set() -> JwkSet {
        serde_json::from_value(json!({
            "keys": [{
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "kid": "test-key",
                "n": MODULUS,
                "e": "AQAB"
            }]
        }))
        .expect("jwk set")
    }

    fn verifier() -> JwksVerifier {
        // Unroutable URL: any fetch attempt fails fast instead of hitting the network.
        JwksVerifier::new("http://127.0.0.1:9/jwks", ISSUER, "food-app")
            .expect("client")
            .with_keys(key_set())
    }

    fn id_token(kid: &str, aud: &str, exp_offset: i64) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let claims = json!({
            "sub": "uid-123",
            "email": "cook@example.com",
            "iss": ISSUER,
            "aud": aud,
            "iat": now,
            "exp": now + exp_offset,
        });
        let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).expect("pem");
        encode(&header, &claims, &key).expect("encode")
    }

    #[tokio::test]
    async fn accepts_token_signed_by_published_key() {
        let caller = verifier()
            .verify(&id_token("test-key", "food-app", 600))
            .await
            .expect("verify");
        assert_eq!(caller.uid(), "uid-123");
        assert_eq!(caller.email(), Some("cook@example.com"));
    }

    #[tokio::test]
    async fn rejects_other_project_audience() {
        let err = verifier()
            .verify(&id_token("test-key", "someone-else", 600))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let err = verifier()
            .verify(&id_token("test-key", "food-app", -3600))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn unknown_kid_on_fresh_keys_does_not_refetch() {
        // A fetch against the unroutable URL would surface as KeysUnavailable.
        let verifier = verifier();
        for _ in 0..3 {
            let err = verifier
                .verify(&id_token("rotated-key", "food-app", 600))
                .await
                .unwrap_err();
            assert!(matches!(err, IdentityError::InvalidToken(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn unknown_kid_refetches_once_per_interval() {
        let fetched_at = Instant::now()
            .checked_sub(MIN_REFETCH_INTERVAL * 2)
            .expect("instant");
        let verifier = JwksVerifier::new("http://127.0.0.1:9/jwks", ISSUER, "food-app")
            .expect("client")
            .with_keys_fetched_at(key_set(), fetched_at);
        let token = id_token("rotated-key", "food-app", 600);

        let first = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(first, IdentityError::KeysUnavailable(_)), "{first:?}");

        let second = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(second, IdentityError::InvalidToken(_)), "{second:?}");

        let known = verifier
            .verify(&id_token("test-key", "food-app", 600))
            .await
            .expect("cached key still verifies");
        assert_eq!(known.uid(), "uid-123");
    }

    #[tokio::test]
    async fn rejects_hs256_tokens() {
        let hs = crate::auth::secret::SharedSecretVerifier::new("s", ISSUER, "food-app")
            .sign("uid-123", None, Duration::from_secs(600))
            .expect("sign");
        let err = verifier().verify(&hs).await.unwrap_err();
        assert!(err.to_string().contains("unexpected algorithm"));
    }
}
