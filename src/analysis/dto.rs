use lazy_static::lazy_static;
use regex::Regex;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Structured payload returned by the vision model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodAnalysis {
    pub food_name: String,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub confidence: Option<f64>,
    #[serde(deserialize_with = "de_number")]
    pub calories: f64,
    #[serde(default)]
    pub serving_size: Option<String>,
    pub macronutrients: Macronutrients,
    #[serde(default)]
    pub vitamins: Option<Vec<Nutrient>>,
    #[serde(default)]
    pub minerals: Option<Vec<Nutrient>>,
    #[serde(default)]
    pub health_insights: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Macronutrients {
    #[serde(deserialize_with = "de_number")]
    pub protein: f64,
    #[serde(deserialize_with = "de_number")]
    pub carbohydrates: f64,
    #[serde(deserialize_with = "de_number")]
    pub fat: f64,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub fiber: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub sugar: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub sodium: Option<f64>,
}

/// One vitamin or mineral line: `{name, amount, dailyValue}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nutrient {
    pub name: String,
    #[serde(default, deserialize_with = "de_text")]
    pub amount: String,
    #[serde(default, deserialize_with = "de_text")]
    pub daily_value: String,
}

lazy_static! {
    static ref LEADING_NUMBER: Regex = Regex::new(r"^\s*(-?\d+(?:\.\d+)?)").unwrap();
}

/// Reads a JSON number, or a string that starts with one ("25", "0.5 g").
pub(crate) fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => LEADING_NUMBER
            .captures(s)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}

fn de_number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(d)?;
    lenient_number(&value).ok_or_else(|| D::Error::custom(format!("expected a number, got {value}")))
}

fn de_opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(lenient_number(&value))
}

fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_number_accepts_units() {
        assert_eq!(lenient_number(&json!(95)), Some(95.0));
        assert_eq!(lenient_number(&json!("25")), Some(25.0));
        assert_eq!(lenient_number(&json!("0.5 g")), Some(0.5));
        assert_eq!(lenient_number(&json!("trace")), None);
        assert_eq!(lenient_number(&json!(null)), None);
    }

    #[test]
    fn optional_macros_stay_absent() {
        let macros: Macronutrients = serde_json::from_value(json!({
            "protein": 0.5, "carbohydrates": "25", "fat": 0.3, "sugar": null
        }))
        .expect("macros");
        assert_eq!(macros.carbohydrates, 25.0);
        assert_eq!(macros.fiber, None);
        assert_eq!(macros.sugar, None);
    }

    #[test]
    fn nutrient_amounts_accept_numbers() {
        let n: Nutrient = serde_json::from_value(json!({
            "name": "Vitamin C", "amount": 8.4, "dailyValue": "9%"
        }))
        .expect("nutrient");
        assert_eq!(n.amount, "8.4");
        assert_eq!(n.daily_value, "9%");
    }
}
