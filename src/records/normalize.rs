//! Maps a model payload onto the stored record shape. Pure, no I/O.
//!
//! This module owns the text encoding of the nested lists and the inline
//! image reference; nothing else serializes or parses them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;

use super::model::{NewRecord, NutritionRecord};
use crate::analysis::{AnalysisError, FoodAnalysis, Nutrient};

pub const DEFAULT_SERVING_SIZE: &str = "1 serving";

lazy_static! {
    static ref DATA_URI: Regex = Regex::new(r"^data:([\w.+-]+/[\w.+-]+);base64,(.*)$").unwrap();
}

pub fn normalize(
    analysis: FoodAnalysis,
    image: &[u8],
    content_type: &str,
) -> Result<NewRecord, AnalysisError> {
    let food_name = analysis.food_name.trim().to_string();
    if food_name.is_empty() {
        return Err(AnalysisError::Malformed("foodName is empty".into()));
    }
    // Zero is a valid reading (water, black coffee); only negatives are rejected.
    if !analysis.calories.is_finite() || analysis.calories < 0.0 {
        return Err(AnalysisError::Malformed(format!(
            "calories out of range: {}",
            analysis.calories
        )));
    }

    let serving_size = analysis
        .serving_size
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVING_SIZE.to_string());

    let macros = analysis.macronutrients;
    Ok(NewRecord {
        food_name,
        serving_size,
        confidence: analysis.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        calories: analysis.calories.round().min(i32::MAX as f64) as i32,
        protein: non_negative(macros.protein),
        carbohydrates: non_negative(macros.carbohydrates),
        fat: non_negative(macros.fat),
        fiber: macros.fiber.map(non_negative),
        sugar: macros.sugar.map(non_negative),
        sodium: macros.sodium.map(non_negative),
        vitamins: encode(&analysis.vitamins.unwrap_or_default()),
        minerals: encode(&analysis.minerals.unwrap_or_default()),
        health_insights: encode(&analysis.health_insights.unwrap_or_default()),
        image_url: data_uri(content_type, image),
    })
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

fn encode<T: serde::Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_nutrients(text: &str) -> Result<Vec<Nutrient>, serde_json::Error> {
    serde_json::from_str(text)
}

pub fn decode_insights(text: &str) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_str(text)
}

impl NutritionRecord {
    pub fn vitamin_list(&self) -> Result<Vec<Nutrient>, serde_json::Error> {
        decode_nutrients(&self.vitamins)
    }

    pub fn mineral_list(&self) -> Result<Vec<Nutrient>, serde_json::Error> {
        decode_nutrients(&self.minerals)
    }

    pub fn insight_list(&self) -> Result<Vec<String>, serde_json::Error> {
        decode_insights(&self.health_insights)
    }
}

pub fn data_uri(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(bytes))
}

/// Decoded inline image. `None` for anything that is not a base64 data URI,
/// which includes URLs already pointing at blob storage.
pub fn split_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let caps = DATA_URI.captures(uri)?;
    let mime = caps.get(1)?.as_str().to_string();
    let bytes = STANDARD.decode(caps.get(2)?.as_str()).ok()?;
    Some((mime, bytes))
}
