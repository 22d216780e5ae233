mod client;
mod dto;
mod prompt;

pub use client::{parse_analysis, AnalysisError, NutritionAnalyzer, OpenAiAnalyzer};
pub use dto::{FoodAnalysis, Macronutrients, Nutrient};
