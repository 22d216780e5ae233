use std::sync::Arc;

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::model::{NewRecord, NutritionRecord};
use super::normalize::split_data_uri;
use super::repo::{RecordRepository, StoreError};
use crate::auth::OwnerId;
use crate::storage::{ext_from_mime, StorageClient};

/// Per-user view over the record collection plus image hosting.
#[derive(Clone)]
pub struct RecordStore {
    repo: Arc<dyn RecordRepository>,
    blobs: Option<Arc<dyn StorageClient>>,
}

impl RecordStore {
    pub fn new(repo: Arc<dyn RecordRepository>, blobs: Option<Arc<dyn StorageClient>>) -> Self {
        Self { repo, blobs }
    }

    /// Writes the record. An inline image is moved to blob storage first when
    /// possible; if that fails the data URI is stored as is.
    #[instrument(skip_all, fields(%owner))]
    pub async fn create(
        &self,
        owner: &OwnerId,
        mut record: NewRecord,
    ) -> Result<NutritionRecord, StoreError> {
        if let Some(url) = self.host_image(owner, &record.image_url).await {
            record.image_url = url;
        }
        let stored = self.repo.insert(owner, record).await?;
        info!(id = %stored.id, "record created");
        Ok(stored)
    }

    async fn host_image(&self, owner: &OwnerId, image_url: &str) -> Option<String> {
        let blobs = self.blobs.as_ref()?;
        let (mime, bytes) = split_data_uri(image_url)?;
        let key = image_key(owner, &mime, OffsetDateTime::now_utc());

        let uploaded: anyhow::Result<String> = async {
            blobs.put_object(&key, Bytes::from(bytes), &mime).await?;
            blobs.public_url(&key).await
        }
        .await;

        match uploaded {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, %key, "image upload failed; keeping inline image");
                None
            }
        }
    }

    pub async fn get(&self, owner: &OwnerId, id: &str) -> Result<Option<NutritionRecord>, StoreError> {
        self.repo.get(owner, id).await
    }

    pub async fn list_all(&self, owner: &OwnerId) -> Result<Vec<NutritionRecord>, StoreError> {
        self.repo.list(owner, None).await
    }

    pub async fn list_recent(
        &self,
        owner: &OwnerId,
        limit: usize,
    ) -> Result<Vec<NutritionRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.repo.list(owner, Some(limit)).await
    }

    pub async fn delete(&self, owner: &OwnerId, id: &str) -> Result<bool, StoreError> {
        self.repo.delete(owner, id).await
    }

    #[instrument(skip_all, fields(%owner))]
    pub async fn clear_all(&self, owner: &OwnerId) -> Result<u64, StoreError> {
        let removed = self.repo.clear(owner).await?;
        info!(removed, "records cleared");
        Ok(removed)
    }
}

fn image_key(owner: &OwnerId, mime: &str, at: OffsetDateTime) -> String {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    let ext = ext_from_mime(mime).unwrap_or("bin");
    format!("food-images/{}/{}.{}", owner, millis, ext)
}
