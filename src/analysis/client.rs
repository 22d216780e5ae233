use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use super::dto::FoodAnalysis;
use super::prompt::{SYSTEM_PROMPT, USER_PROMPT};
use crate::config::OpenAiConfig;

/// Fields the payload must carry before it is accepted at all.
const REQUIRED_FIELDS: [&str; 3] = ["foodName", "calories", "macronutrients"];

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Transport(String),

    #[error("analysis service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("analysis response unreadable: {0}")]
    Unparsable(String),

    #[error("analysis malformed: {0}")]
    Malformed(String),
}

/// Turns image bytes into a nutrition estimate. One call, no retries.
#[async_trait]
pub trait NutritionAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8], content_type: &str)
        -> Result<FoodAnalysis, AnalysisError>;
}

/// Chat-completions client for a multimodal model in JSON mode.
pub struct OpenAiAnalyzer {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    response_format: Value,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiAnalyzer {
    pub fn new(config: &OpenAiConfig) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn request_body<'a>(&'a self, image: &[u8], content_type: &str) -> CompletionRequest<'a> {
        let data_url = format!("data:{};base64,{}", content_type, STANDARD.encode(image));
        CompletionRequest {
            model: &self.model,
            messages: vec![
                json!({ "role": "system", "content": SYSTEM_PROMPT }),
                json!({
                    "role": "user",
                    "content": [
                        { "type": "text", "text": USER_PROMPT },
                        { "type": "image_url", "image_url": { "url": data_url, "detail": "high" } }
                    ]
                }),
            ],
            response_format: json!({ "type": "json_object" }),
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl NutritionAnalyzer for OpenAiAnalyzer {
    #[instrument(skip(self, image), fields(bytes = image.len(), model = %self.model))]
    async fn analyze(
        &self,
        image: &[u8],
        content_type: &str,
    ) -> Result<FoodAnalysis, AnalysisError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(image, content_type))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "vision request failed");
                AnalysisError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "vision service rejected request");
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Unparsable(e.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AnalysisError::Unparsable("completion has no content".into()))?;
        debug!(chars = content.len(), "vision completion received");

        let analysis = parse_analysis(&content)?;
        info!(food = %analysis.food_name, calories = analysis.calories, "food analyzed");
        Ok(analysis)
    }
}

/// Parses the model's JSON text and checks it carries the mandatory fields.
/// A payload missing any of them is rejected whole.
pub fn parse_analysis(content: &str) -> Result<FoodAnalysis, AnalysisError> {
    let value: Value =
        serde_json::from_str(content).map_err(|e| AnalysisError::Unparsable(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| AnalysisError::Malformed("payload is not a JSON object".into()))?;

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| object.get(*field).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(AnalysisError::Malformed(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    serde_json::from_value(value).map_err(|e| AnalysisError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPLE: &str = r#"{
        "foodName": "Apple",
        "confidence": 0.92,
        "calories": 95,
        "servingSize": "1 medium (182g)",
        "macronutrients": { "protein": 0.5, "carbohydrates": 25, "fat": 0.3, "fiber": 4.4 },
        "vitamins": [{ "name": "Vitamin C", "amount": "8.4mg", "dailyValue": "9%" }],
        "healthInsights": ["Good source of fiber"]
    }"#;

    #[test]
    fn parses_complete_payload() {
        let analysis = parse_analysis(APPLE).expect("parse");
        assert_eq!(analysis.food_name, "Apple");
        assert_eq!(analysis.calories, 95.0);
        assert_eq!(analysis.macronutrients.fiber, Some(4.4));
        assert_eq!(analysis.macronutrients.sodium, None);
        assert_eq!(analysis.vitamins.as_ref().map(Vec::len), Some(1));
        assert!(analysis.minerals.is_none());
    }

    #[test]
    fn missing_calories_is_malformed() {
        let err = parse_analysis(
            r#"{"foodName": "Apple", "macronutrients": {"protein": 1, "carbohydrates": 2, "fat": 3}}"#,
        )
        .unwrap_err();
        match err {
            AnalysisError::Malformed(msg) => assert!(msg.contains("calories")),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn null_required_field_counts_as_missing() {
        let err = parse_analysis(
            r#"{"foodName": null, "calories": 10, "macronutrients": {"protein": 1, "carbohydrates": 2, "fat": 3}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }

    #[test]
    fn non_numeric_calories_is_malformed() {
        let err = parse_analysis(
            r#"{"foodName": "Soup", "calories": "lots", "macronutrients": {"protein": 1, "carbohydrates": 2, "fat": 3}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }

    #[test]
    fn non_json_content_is_unparsable() {
        let err = parse_analysis("I think this is an apple.").unwrap_err();
        assert!(matches!(err, AnalysisError::Unparsable(_)));
        let err = parse_analysis("[1, 2]").unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }

    #[test]
    fn request_body_embeds_image_as_data_url() {
        let analyzer = OpenAiAnalyzer::new(&OpenAiConfig {
            api_key: "sk-test".into(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            max_tokens: 1000,
            timeout_secs: 5,
        })
        .expect("client");
        assert_eq!(analyzer.endpoint, "https://api.openai.com/v1/chat/completions");

        let body = serde_json::to_value(analyzer.request_body(b"abc", "image/png")).expect("json");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,YWJj"
        );
    }
}
