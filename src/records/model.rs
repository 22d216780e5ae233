use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// A persisted nutrition analysis. Vitamins, minerals and health insights are
/// JSON text; see [`super::normalize`] for the only encoder/decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionRecord {
    pub id: String,
    pub user_id: String,
    pub food_name: String,
    pub serving_size: String,
    pub confidence: f64,
    pub calories: i32,
    pub protein: f64,
    pub carbohydrates: f64,
    pub fat: f64,
    pub fiber: Option<f64>,
    pub sugar: Option<f64>,
    pub sodium: Option<f64>,
    pub vitamins: String,
    pub minerals: String,
    pub health_insights: String,
    pub image_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Record content before the store assigns id, owner and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub food_name: String,
    pub serving_size: String,
    pub confidence: f64,
    pub calories: i32,
    pub protein: f64,
    pub carbohydrates: f64,
    pub fat: f64,
    pub fiber: Option<f64>,
    pub sugar: Option<f64>,
    pub sodium: Option<f64>,
    pub vitamins: String,
    pub minerals: String,
    pub health_insights: String,
    pub image_url: String,
}

impl NewRecord {
    pub(crate) fn materialize(
        self,
        id: Uuid,
        user_id: &str,
        created_at: OffsetDateTime,
    ) -> NutritionRecord {
        NutritionRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            food_name: self.food_name,
            serving_size: self.serving_size,
            confidence: self.confidence,
            calories: self.calories,
            protein: self.protein,
            carbohydrates: self.carbohydrates,
            fat: self.fat,
            fiber: self.fiber,
            sugar: self.sugar,
            sodium: self.sodium,
            vitamins: self.vitamins,
            minerals: self.minerals,
            health_insights: self.health_insights,
            image_url: self.image_url,
            created_at,
        }
    }
}

/// Row shape of the `food_analyses` table.
#[derive(Debug, FromRow)]
pub(crate) struct RecordRow {
    pub id: Uuid,
    pub user_id: String,
    pub food_name: String,
    pub serving_size: String,
    pub confidence: f64,
    pub calories: i32,
    pub protein: f64,
    pub carbohydrates: f64,
    pub fat: f64,
    pub fiber: Option<f64>,
    pub sugar: Option<f64>,
    pub sodium: Option<f64>,
    pub vitamins: String,
    pub minerals: String,
    pub health_insights: String,
    pub image_url: String,
    pub created_at: OffsetDateTime,
}

impl From<RecordRow> for NutritionRecord {
    fn from(r: RecordRow) -> Self {
        Self {
            id: r.id.to_string(),
            user_id: r.user_id,
            food_name: r.food_name,
            serving_size: r.serving_size,
            confidence: r.confidence,
            calories: r.calories,
            protein: r.protein,
            carbohydrates: r.carbohydrates,
            fat: r.fat,
            fiber: r.fiber,
            sugar: r.sugar,
            sodium: r.sodium,
            vitamins: r.vitamins,
            minerals: r.minerals,
            health_insights: r.health_insights,
            image_url: r.image_url,
            created_at: r.created_at,
        }
    }
}
