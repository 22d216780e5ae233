use thiserror::Error;

pub const DEFAULT_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// How bearer tokens are verified.
#[derive(Debug, Clone)]
pub enum IdentityConfig {
    /// RS256 ID tokens checked against the provider's published key set.
    Jwks {
        project_id: String,
        jwks_url: String,
        issuer: String,
    },
    /// HS256 tokens signed with a local secret (development and tests).
    SharedSecret {
        secret: String,
        issuer: String,
        audience: String,
    },
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Stored image URLs are built from this, so they never expire.
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub identity: IdentityConfig,
    pub openai: OpenAiConfig,
    pub storage: Option<StorageConfig>,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let database_url = require("DATABASE_URL")?;

        let identity = match get("AUTH_MODE").as_deref().unwrap_or("jwks") {
            "jwks" => {
                let project_id = require("IDENTITY_PROJECT_ID")?;
                IdentityConfig::Jwks {
                    jwks_url: get("IDENTITY_JWKS_URL").unwrap_or_else(|| DEFAULT_JWKS_URL.into()),
                    issuer: get("IDENTITY_ISSUER")
                        .unwrap_or_else(|| format!("https://securetoken.google.com/{project_id}")),
                    project_id,
                }
            }
            "shared_secret" => IdentityConfig::SharedSecret {
                secret: require("JWT_SECRET")?,
                issuer: get("JWT_ISSUER").unwrap_or_else(|| "foodlens".into()),
                audience: get("JWT_AUDIENCE").unwrap_or_else(|| "foodlens-users".into()),
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "AUTH_MODE",
                    value: other.to_string(),
                })
            }
        };

        let openai = OpenAiConfig {
            api_key: require("OPENAI_API_KEY")?,
            base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".into())
                .trim_end_matches('/')
                .to_string(),
            model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".into()),
            max_tokens: parse_or(&get, "OPENAI_MAX_TOKENS", 1000)?,
            timeout_secs: parse_or(&get, "OPENAI_TIMEOUT_SECS", 60)?,
        };

        let storage = match get("STORAGE_BUCKET") {
            Some(bucket) => Some(StorageConfig {
                endpoint: require("STORAGE_ENDPOINT")?,
                bucket,
                access_key: require("STORAGE_ACCESS_KEY")?,
                secret_key: require("STORAGE_SECRET_KEY")?,
                region: get("STORAGE_REGION").unwrap_or_else(|| "us-east-1".into()),
                public_base_url: require("STORAGE_PUBLIC_BASE_URL")?
                    .trim_end_matches('/')
                    .to_string(),
            }),
            None => None,
        };

        Ok(Self {
            database_url,
            identity,
            openai,
            storage,
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        })
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
