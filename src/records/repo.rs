use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::model::{NewRecord, NutritionRecord, RecordRow};
use crate::auth::OwnerId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Document collection of nutrition records, partitioned by owner. Every
/// method takes the owner first; no query spans owners.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Stores the record, assigning id and creation timestamp.
    async fn insert(&self, owner: &OwnerId, record: NewRecord)
        -> Result<NutritionRecord, StoreError>;

    async fn get(&self, owner: &OwnerId, id: &str) -> Result<Option<NutritionRecord>, StoreError>;

    /// Newest first. `limit = None` returns everything.
    async fn list(
        &self,
        owner: &OwnerId,
        limit: Option<i64>,
    ) -> Result<Vec<NutritionRecord>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, owner: &OwnerId, id: &str) -> Result<bool, StoreError>;

    /// Removes every record of the owner; returns how many went.
    async fn clear(&self, owner: &OwnerId) -> Result<u64, StoreError>;
}

const COLUMNS: &str = "id, user_id, food_name, serving_size, confidence, calories, \
     protein, carbohydrates, fat, fiber, sugar, sodium, \
     vitamins, minerals, health_insights, image_url, created_at";

#[derive(Clone)]
pub struct PgRecordRepository {
    db: PgPool,
}

impl PgRecordRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordRepository for PgRecordRepository {
    async fn insert(
        &self,
        owner: &OwnerId,
        record: NewRecord,
    ) -> Result<NutritionRecord, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            INSERT INTO food_analyses (
                id, user_id, food_name, serving_size, confidence, calories,
                protein, carbohydrates, fat, fiber, sugar, sodium,
                vitamins, minerals, health_insights, image_url, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, clock_timestamp())
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(owner.as_str())
        .bind(&record.food_name)
        .bind(&record.serving_size)
        .bind(record.confidence)
        .bind(record.calories)
        .bind(record.protein)
        .bind(record.carbohydrates)
        .bind(record.fat)
        .bind(record.fiber)
        .bind(record.sugar)
        .bind(record.sodium)
        .bind(&record.vitamins)
        .bind(&record.minerals)
        .bind(&record.health_insights)
        .bind(&record.image_url)
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn get(&self, owner: &OwnerId, id: &str) -> Result<Option<NutritionRecord>, StoreError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM food_analyses
            WHERE id = $1 AND user_id = $2
            "#
        ))
        .bind(id)
        .bind(owner.as_str())
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list(
        &self,
        owner: &OwnerId,
        limit: Option<i64>,
    ) -> Result<Vec<NutritionRecord>, StoreError> {
        // LIMIT NULL means no limit in Postgres.
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM food_analyses
            WHERE user_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2
            "#
        ))
        .bind(owner.as_str())
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete(&self, owner: &OwnerId, id: &str) -> Result<bool, StoreError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(false);
        };
        let result = sqlx::query("DELETE FROM food_analyses WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner.as_str())
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, owner: &OwnerId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM food_analyses WHERE user_id = $1")
            .bind(owner.as_str())
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
