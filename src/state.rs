use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use tracing::{info, warn};

use crate::analysis::{NutritionAnalyzer, OpenAiAnalyzer};
use crate::auth::{self, IdentityVerifier};
use crate::config::AppConfig;
use crate::records::{PgRecordRepository, RecordRepository, RecordStore};
use crate::storage::{Storage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub analyzer: Arc<dyn NutritionAnalyzer>,
    pub records: RecordStore,
}

impl FromRef<AppState> for Arc<dyn IdentityVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

impl AppState {
    /// Wires the production collaborators. Returns the pool too so the caller
    /// can run migrations on it.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, sqlx::PgPool)> {
        let config = Arc::new(config);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let identity =
            auth::verifier_from_config(&config.identity).context("build identity verifier")?;
        let analyzer = Arc::new(
            OpenAiAnalyzer::new(&config.openai).context("build vision analysis client")?,
        ) as Arc<dyn NutritionAnalyzer>;

        let blobs = match &config.storage {
            Some(storage) => {
                let client = Storage::new(storage).await.context("configure blob storage")?;
                info!(bucket = %storage.bucket, "blob storage enabled");
                Some(Arc::new(client) as Arc<dyn StorageClient>)
            }
            None => {
                warn!("no STORAGE_BUCKET configured; images will be stored inline");
                None
            }
        };

        let repo = Arc::new(PgRecordRepository::new(db.clone())) as Arc<dyn RecordRepository>;
        let state = Self::from_parts(config, identity, analyzer, RecordStore::new(repo, blobs));
        Ok((state, db))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        identity: Arc<dyn IdentityVerifier>,
        analyzer: Arc<dyn NutritionAnalyzer>,
        records: RecordStore,
    ) -> Self {
        Self {
            config,
            identity,
            analyzer,
            records,
        }
    }
}
